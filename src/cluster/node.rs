use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cluster::balancer::{assignment_channel, Assignment, AssignmentNotice, BalancerError, LoadBalancer, Reassignment};
use crate::cluster::health::HealthThresholds;
use crate::cluster::lease::{LeaseManager, LeaseRenewal};
use crate::cluster::metrics::LoadTracker;
use crate::cluster::policy::AssignmentPolicy;
use crate::cluster::registry::{InstanceMetrics, InstanceRecord, InstanceRegistry};
use crate::cluster::store::{SharedStateStore, StoreError};
use crate::db::match_repository::MatchRepository;
use crate::error::LiveMatchError;
use crate::services::broadcaster::Broadcaster;
use crate::services::match_engine::MatchEngine;
use crate::services::match_queries::MatchQueryService;

/// Runtime settings of one server instance
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub instance_id: String,
    pub address: String,
    pub max_connections: usize,
    pub heartbeat_interval: Duration,
    pub instance_ttl: Duration,
    pub lease_ttl: Duration,
    pub lease_renew_interval: Duration,
    pub lease_renew_timeout: Duration,
    pub sweep_interval: Duration,
    pub policy: AssignmentPolicy,
    pub thresholds: HealthThresholds,
    pub viewer_idle_timeout: Duration,
    pub viewer_ping_interval: Duration,
    pub viewer_channel_capacity: usize,
    /// Sliding window for error rate and response time
    pub load_window: Duration,
}

impl NodeConfig {
    /// Defaults matching `configuration/base.yml`
    pub fn for_instance(instance_id: impl Into<String>) -> Self {
        let instance_id = instance_id.into();
        Self {
            address: format!("http://{}", instance_id),
            instance_id,
            max_connections: 10_000,
            heartbeat_interval: Duration::from_secs(15),
            instance_ttl: Duration::from_secs(45),
            lease_ttl: Duration::from_secs(30),
            lease_renew_interval: Duration::from_secs(10),
            lease_renew_timeout: Duration::from_millis(2000),
            sweep_interval: Duration::from_secs(15),
            policy: AssignmentPolicy::default(),
            thresholds: HealthThresholds::default(),
            viewer_idle_timeout: Duration::from_secs(120),
            viewer_ping_interval: Duration::from_secs(30),
            viewer_channel_capacity: 256,
            load_window: Duration::from_secs(60),
        }
    }
}

/// One server instance: the match core wired to the cluster coordination
/// layer, plus the periodic duties that keep it in the cluster.
pub struct ClusterNode {
    pub config: NodeConfig,
    pub store: Arc<dyn SharedStateStore>,
    pub repository: Arc<dyn MatchRepository>,
    pub registry: InstanceRegistry,
    pub leases: Arc<LeaseManager>,
    pub balancer: Arc<LoadBalancer>,
    pub load: Arc<LoadTracker>,
    pub broadcaster: Arc<Broadcaster>,
    pub engine: Arc<MatchEngine>,
    pub queries: MatchQueryService,
    started_at: DateTime<Utc>,
    assignment_listener: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterNode {
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn SharedStateStore>,
        repository: Arc<dyn MatchRepository>,
    ) -> Arc<Self> {
        let instance_id = config.instance_id.clone();
        let registry = InstanceRegistry::new(store.clone(), config.instance_ttl);
        let leases = Arc::new(LeaseManager::new(
            store.clone(),
            instance_id.clone(),
            config.lease_ttl,
            config.lease_renew_timeout,
        ));
        let balancer = Arc::new(LoadBalancer::new(
            store.clone(),
            registry.clone(),
            instance_id.clone(),
            config.policy,
            config.thresholds.clone(),
            config.sweep_interval,
        ));
        let load = Arc::new(LoadTracker::new(config.load_window));
        let broadcaster = Broadcaster::new(
            instance_id.clone(),
            store.clone(),
            load.clone(),
            config.viewer_channel_capacity,
            config.viewer_idle_timeout,
        );
        let engine = Arc::new(MatchEngine::new(
            instance_id,
            repository.clone(),
            leases.clone(),
            balancer.clone(),
            broadcaster.clone(),
            load.clone(),
        ));
        let queries = MatchQueryService::new(repository.clone(), engine.clone());

        Arc::new(Self {
            config,
            store,
            repository,
            registry,
            leases,
            balancer,
            load,
            broadcaster,
            engine,
            queries,
            started_at: Utc::now(),
            assignment_listener: Mutex::new(None),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.config.instance_id
    }

    /// Publish this instance's load and self-assessed health.
    pub async fn heartbeat(&self) -> Result<InstanceRecord, StoreError> {
        if let Err(e) = self.balancer.refresh_thresholds().await {
            warn!("Could not refresh shared thresholds: {}", e);
        }

        let owned_matches = self.engine.owned_matches().await;
        let usage = self.load.system_usage().await;
        let metrics = InstanceMetrics {
            connections: self.load.connections(),
            max_connections: self.config.max_connections,
            owned_matches: owned_matches.len(),
            cpu_percent: usage.cpu_percent,
            memory_percent: usage.memory_percent,
            error_rate: self.load.error_rate().await,
            avg_response_time_ms: self.load.avg_response_time_ms().await,
        };

        let (status, degraded_reasons) = self.balancer.thresholds().await.evaluate(&metrics);
        let record = InstanceRecord {
            instance_id: self.config.instance_id.clone(),
            address: self.config.address.clone(),
            status,
            degraded_reasons,
            metrics,
            owned_matches,
            started_at: self.started_at,
            last_heartbeat: Utc::now(),
        };

        self.registry.heartbeat(&record).await?;
        Ok(record)
    }

    pub async fn renew_leases(&self) -> LeaseRenewal {
        self.engine.maintain_leases().await
    }

    /// Pick an owner for `match_id`. When this instance is chosen it claims
    /// the match straight away.
    pub async fn assign(&self, match_id: Uuid) -> Result<Assignment, LiveMatchError> {
        let assignment = self.balancer.assign(match_id).await?;
        if !assignment.existing_owner && assignment.instance_id == self.config.instance_id {
            self.engine.claim(match_id).await?;
        }
        Ok(assignment)
    }

    /// Dead-instance sweep; matches handed to this instance are claimed here.
    pub async fn sweep(&self) -> Result<Vec<Reassignment>, BalancerError> {
        let reassignments = self.balancer.sweep_dead_instances().await?;
        for reassignment in &reassignments {
            if reassignment.to_instance_id == self.config.instance_id {
                self.claim_assigned(reassignment.match_id).await;
            }
        }
        Ok(reassignments)
    }

    /// Claim every match the assignment hash gives to this instance but
    /// that it does not own yet. Covers missed assignment notices.
    pub async fn reconcile_assignments(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut claimed = Vec::new();
        for match_id in self.balancer.assignments_for(&self.config.instance_id).await? {
            if self.leases.is_held(match_id).await {
                continue;
            }
            if self.claim_assigned(match_id).await {
                claimed.push(match_id);
            }
        }
        Ok(claimed)
    }

    /// Listen on this instance's assignment channel and claim what arrives.
    pub async fn listen_for_assignments(self: &Arc<Self>) -> Result<(), StoreError> {
        let channel = assignment_channel(&self.config.instance_id);
        let mut notices = self.store.subscribe(&channel).await?;
        let node = Arc::clone(self);

        let handle = tokio::spawn(async move {
            while let Some(payload) = notices.next().await {
                match serde_json::from_str::<AssignmentNotice>(&payload) {
                    Ok(notice) => {
                        if node.leases.is_held(notice.match_id).await {
                            continue;
                        }
                        node.claim_assigned(notice.match_id).await;
                    }
                    Err(e) => warn!("Ignoring malformed assignment notice: {}", e),
                }
            }
            warn!("Assignment channel for {} closed", node.config.instance_id);
        });

        if let Some(previous) = self.assignment_listener.lock().await.replace(handle) {
            previous.abort();
        }
        info!("👂 Instance {} listening on {}", self.config.instance_id, channel);
        Ok(())
    }

    pub async fn sweep_idle_viewers(&self) -> usize {
        self.broadcaster.sweep_idle().await.len()
    }

    /// Leave the cluster cleanly: stop claiming, hand back leases and
    /// remove the registry entry so peers reassign without waiting for TTLs.
    pub async fn shutdown(&self) {
        if let Some(listener) = self.assignment_listener.lock().await.take() {
            listener.abort();
        }

        let released = self.engine.release_all().await;
        self.broadcaster.flush().await;

        if let Err(e) = self.registry.deregister(&self.config.instance_id).await {
            error!("Failed to deregister instance {}: {}", self.config.instance_id, e);
        }
        info!(
            "🛑 Instance {} shut down, released {} lease(s)",
            self.config.instance_id,
            released.len()
        );
    }

    /// Returns whether the claim succeeded.
    async fn claim_assigned(&self, match_id: Uuid) -> bool {
        match self.engine.claim(match_id).await {
            Ok(_) => true,
            Err(e @ (LiveMatchError::MatchTerminal(_) | LiveMatchError::MatchNotFound(_))) => {
                info!("Dropping stale assignment of match {}: {}", match_id, e);
                if let Err(e) = self.balancer.clear_assignment(match_id).await {
                    warn!("Failed to clear assignment of match {}: {}", match_id, e);
                }
                false
            }
            Err(e) => {
                warn!("Could not claim assigned match {}: {}", match_id, e);
                false
            }
        }
    }
}
