use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::cluster::node::ClusterNode;

/// Periodic duties that keep an instance in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterJob {
    Heartbeat,
    LeaseRenewal,
    Sweep,
    IdleViewers,
}

pub struct ClusterScheduler {
    scheduler: Arc<Mutex<JobScheduler>>,
    node: Arc<ClusterNode>,
    // Track registered jobs by kind -> job_id
    active_jobs: Arc<Mutex<HashMap<ClusterJob, Uuid>>>,
}

impl ClusterScheduler {
    pub async fn new(node: Arc<ClusterNode>) -> Result<Self, JobSchedulerError> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            node,
            active_jobs: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Register every cluster job and start ticking.
    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        let config = self.node.config.clone();

        self.register(ClusterJob::Heartbeat, config.heartbeat_interval, |node| async move {
            if let Err(e) = node.heartbeat().await {
                tracing::error!("❌ Heartbeat for {} failed: {}", node.instance_id(), e);
            }
        })
        .await?;

        self.register(ClusterJob::LeaseRenewal, config.lease_renew_interval, |node| async move {
            let renewal = node.renew_leases().await;
            if !renewal.lost.is_empty() {
                tracing::warn!("⚠️ Lost {} lease(s): {:?}", renewal.lost.len(), renewal.lost);
            }
        })
        .await?;

        self.register(ClusterJob::Sweep, config.sweep_interval, |node| async move {
            match node.sweep().await {
                Ok(reassignments) if !reassignments.is_empty() => {
                    tracing::info!("🔁 Sweep reassigned {} match(es)", reassignments.len());
                }
                Ok(_) => {}
                Err(e) => tracing::error!("❌ Dead-instance sweep failed: {}", e),
            }
            if let Err(e) = node.reconcile_assignments().await {
                tracing::error!("❌ Assignment reconcile failed: {}", e);
            }
        })
        .await?;

        self.register(ClusterJob::IdleViewers, config.viewer_ping_interval, |node| async move {
            node.sweep_idle_viewers().await;
        })
        .await?;

        let scheduler = self.scheduler.lock().await;
        scheduler.start().await?;

        tracing::info!("✅ Cluster scheduler started for instance {}", self.node.instance_id());
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), JobSchedulerError> {
        let mut scheduler = self.scheduler.lock().await;
        scheduler.shutdown().await?;
        self.active_jobs.lock().await.clear();

        tracing::info!("🛑 Cluster scheduler stopped");
        Ok(())
    }

    pub async fn registered_jobs(&self) -> Vec<ClusterJob> {
        self.active_jobs.lock().await.keys().copied().collect()
    }

    async fn register<F, Fut>(&self, kind: ClusterJob, every: Duration, task: F) -> Result<(), JobSchedulerError>
    where
        F: Fn(Arc<ClusterNode>) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let node = self.node.clone();
        let job = Job::new_repeated_async(every, move |_uuid, _l| {
            let node = node.clone();
            let task = task.clone();
            Box::pin(async move { task(node).await })
        })?;

        let job_id = job.guid();
        self.scheduler.lock().await.add(job).await?;
        self.active_jobs.lock().await.insert(kind, job_id);

        tracing::info!("⏱️ Scheduled {:?} every {:?}", kind, every);
        Ok(())
    }
}
