use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;

use matchday_live::cluster::{ClusterNode, RedisStateStore};
use matchday_live::config::settings::{get_config, get_redis_url};
use matchday_live::db::PgMatchRepository;
use matchday_live::run;
use matchday_live::services::ClusterScheduler;
use matchday_live::telemetry::{get_subscriber, init_subscriber};

fn fail(message: String) -> std::io::Error {
    tracing::error!("❌ {}", message);
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = get_config().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let subscriber = get_subscriber(
        "matchday-live".into(),
        config.application.log_level.clone(),
        std::io::stdout
    );
    init_subscriber(subscriber);

    let node_config = config.node_config().map_err(|e| fail(format!("Invalid cluster settings: {}", e)))?;

    // Redis carries leases, the registry and the update bus
    let redis_client = redis::Client::open(get_redis_url(&config).expose_secret())
        .map_err(|e| fail(format!("Failed to create Redis client: {}", e)))?;
    let store = RedisStateStore::new(Arc::new(redis_client))
        .await
        .map_err(|e| fail(format!("Failed to connect to Redis: {}", e)))?;
    tracing::info!("Redis state store connected");

    // Only try to establish connection when actually used
    let connection_pool = PgPoolOptions::new()
        .max_connections(32)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect_lazy(config.database.connection_string().expose_secret())
        .map_err(|e| fail(format!("Failed to create Postgres connection pool: {}", e)))?;
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .map_err(|e| fail(format!("Failed to run migrations: {}", e)))?;

    let node = ClusterNode::new(
        node_config,
        Arc::new(store),
        Arc::new(PgMatchRepository::new(connection_pool)),
    );
    tracing::info!("🚀 Starting instance {}", node.instance_id());

    node.heartbeat().await.map_err(|e| fail(format!("Initial heartbeat failed: {}", e)))?;
    node.listen_for_assignments()
        .await
        .map_err(|e| fail(format!("Failed to listen for assignments: {}", e)))?;

    let scheduler = ClusterScheduler::new(node.clone())
        .await
        .map_err(|e| fail(format!("Failed to create cluster scheduler: {}", e)))?;
    scheduler.start()
        .await
        .map_err(|e| fail(format!("Failed to start cluster scheduler: {}", e)))?;

    let address = format!("{}:{}", config.application.host, config.application.port);
    let listener = TcpListener::bind(&address)?;
    let served = run(listener, node.clone())?.await;

    if let Err(e) = scheduler.stop().await {
        tracing::warn!("Scheduler did not stop cleanly: {}", e);
    }
    node.shutdown().await;
    served
}
