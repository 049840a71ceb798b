use std::sync::Arc;

use matchday_live::cluster::InMemoryStateStore;
use matchday_live::db::InMemoryMatchRepository;
use matchday_live::services::scheduler::{ClusterJob, ClusterScheduler};

mod common;
use common::cluster_helpers::spawn_node;
use common::utils::init_tracing;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduler_registers_every_cluster_job() {
    init_tracing();
    let node = spawn_node(
        Arc::new(InMemoryStateStore::new()),
        Arc::new(InMemoryMatchRepository::new()),
        "instance-a",
    );

    let scheduler = ClusterScheduler::new(node).await.expect("Failed to create scheduler");
    scheduler.start().await.expect("Failed to start scheduler");

    let mut jobs = scheduler.registered_jobs().await;
    jobs.sort_by_key(|job| format!("{:?}", job));
    assert_eq!(
        jobs,
        vec![
            ClusterJob::Heartbeat,
            ClusterJob::IdleViewers,
            ClusterJob::LeaseRenewal,
            ClusterJob::Sweep,
        ]
    );

    scheduler.stop().await.expect("Failed to stop scheduler");
    assert!(scheduler.registered_jobs().await.is_empty());
}
