use std::net::TcpListener;
use std::sync::Arc;

use once_cell::sync::Lazy;

use matchday_live::cluster::{ClusterNode, InMemoryStateStore};
use matchday_live::db::InMemoryMatchRepository;
use matchday_live::run;
use matchday_live::telemetry::{get_subscriber, init_subscriber};

use super::cluster_helpers::spawn_node;

// Ensure that the `tracing` stack is only initialised once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

pub fn init_tracing() {
    Lazy::force(&TRACING);
}

pub struct TestApp {
    pub address: String,
    pub ws_address: String,
    pub node: Arc<ClusterNode>,
    pub store: Arc<InMemoryStateStore>,
    pub repository: Arc<InMemoryMatchRepository>,
}

/// One instance on a random port backed by fresh in-memory stores.
pub async fn spawn_app() -> TestApp {
    spawn_app_on(Arc::new(InMemoryStateStore::new()), Arc::new(InMemoryMatchRepository::new()), "instance-a").await
}

/// Several apps sharing `store` and `repository` behave like one cluster.
pub async fn spawn_app_on(
    store: Arc<InMemoryStateStore>,
    repository: Arc<InMemoryMatchRepository>,
    instance_id: &str,
) -> TestApp {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    // Get port assigned by the OS
    let port = listener.local_addr().unwrap().port();

    let node = spawn_node(store.clone(), repository.clone(), instance_id);
    node.heartbeat().await.expect("Initial heartbeat failed");

    let server = run(listener, node.clone()).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        ws_address: format!("ws://127.0.0.1:{}", port),
        node,
        store,
        repository,
    }
}
