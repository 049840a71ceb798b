use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cluster::health::HealthThresholds;
use crate::cluster::lease::lease_key;
use crate::cluster::policy::AssignmentPolicy;
use crate::cluster::registry::{InstanceRecord, InstanceRegistry, InstanceStatus};
use crate::cluster::store::{SharedStateStore, StoreError};

/// Advisory hash of match id -> instance id
pub const ASSIGNMENTS_KEY: &str = "match:assignments";
pub const THRESHOLDS_KEY: &str = "balancer:thresholds";
pub const SWEEP_LEASE_KEY: &str = "balancer:sweep";

pub fn assignment_channel(instance_id: &str) -> String {
    format!("instance:{}:assignments", instance_id)
}

#[derive(Debug, Error)]
pub enum BalancerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no healthy instance is available")]
    NoHealthyInstance,
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),
}

/// Message sent to an instance on its assignment channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentNotice {
    pub match_id: Uuid,
    pub previous_instance_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub match_id: Uuid,
    pub instance_id: String,
    /// True when a live lease already decided the owner.
    pub existing_owner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reassignment {
    pub match_id: Uuid,
    pub from_instance_id: String,
    pub to_instance_id: String,
}

/// Instance as the balancer currently judges it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceHealth {
    pub instance_id: String,
    pub address: String,
    pub healthy: bool,
    pub status: InstanceStatus,
    pub reasons: Vec<String>,
    pub connections: usize,
    pub owned_matches: usize,
    pub connection_utilization: f64,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerStatus {
    pub policy: AssignmentPolicy,
    pub thresholds: HealthThresholds,
    pub instances: Vec<InstanceHealth>,
    pub healthy_instances: usize,
    pub degraded_instances: usize,
    pub total_connections: usize,
    pub total_matches: usize,
    pub recommendations: Vec<String>,
}

/// Picks owners for matches and recovers matches from dead instances.
///
/// Everything here is advisory: the assignment hash only tells an instance
/// which matches to claim. Ownership itself is the lease.
pub struct LoadBalancer {
    store: Arc<dyn SharedStateStore>,
    registry: InstanceRegistry,
    instance_id: String,
    policy: RwLock<AssignmentPolicy>,
    thresholds: RwLock<HealthThresholds>,
    cursor: AtomicUsize,
    sweep_ttl: Duration,
}

impl LoadBalancer {
    pub fn new(
        store: Arc<dyn SharedStateStore>,
        registry: InstanceRegistry,
        instance_id: impl Into<String>,
        policy: AssignmentPolicy,
        thresholds: HealthThresholds,
        sweep_ttl: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            instance_id: instance_id.into(),
            policy: RwLock::new(policy),
            thresholds: RwLock::new(thresholds),
            cursor: AtomicUsize::new(0),
            sweep_ttl,
        }
    }

    pub async fn policy(&self) -> AssignmentPolicy {
        *self.policy.read().await
    }

    pub async fn set_policy(&self, policy: AssignmentPolicy) {
        *self.policy.write().await = policy;
        info!("⚖️ Assignment policy set to {}", policy);
    }

    pub async fn thresholds(&self) -> HealthThresholds {
        self.thresholds.read().await.clone()
    }

    /// Validate, apply locally and share with the other instances.
    pub async fn set_thresholds(&self, thresholds: HealthThresholds) -> Result<(), BalancerError> {
        thresholds.validate().map_err(BalancerError::InvalidThresholds)?;
        let payload = serde_json::to_string(&thresholds).map_err(StoreError::from)?;
        self.store.set(THRESHOLDS_KEY, &payload).await?;
        *self.thresholds.write().await = thresholds;
        info!("⚖️ Health thresholds updated");
        Ok(())
    }

    /// Pick up thresholds another instance may have written.
    pub async fn refresh_thresholds(&self) -> Result<(), BalancerError> {
        if let Some(payload) = self.store.get(THRESHOLDS_KEY).await? {
            match serde_json::from_str::<HealthThresholds>(&payload) {
                Ok(shared) => *self.thresholds.write().await = shared,
                Err(e) => warn!("Ignoring malformed shared thresholds: {}", e),
            }
        }
        Ok(())
    }

    /// Live instances that pass the current thresholds, ordered by id.
    pub async fn healthy_instances(&self) -> Result<Vec<InstanceRecord>, BalancerError> {
        let thresholds = self.thresholds().await;
        Ok(self
            .registry
            .live_instances()
            .await?
            .into_iter()
            .filter(|record| {
                record.status == InstanceStatus::Healthy
                    && thresholds.evaluate(&record.metrics).0 == InstanceStatus::Healthy
            })
            .collect())
    }

    /// Decide which instance should own `match_id`. A live lease wins;
    /// otherwise the policy picks among healthy instances and the chosen
    /// instance is told to claim the match.
    pub async fn assign(&self, match_id: Uuid) -> Result<Assignment, BalancerError> {
        if let Some(holder) = self.store.get(&lease_key(match_id)).await? {
            self.record_assignment(match_id, &holder).await?;
            return Ok(Assignment {
                match_id,
                instance_id: holder,
                existing_owner: true,
            });
        }

        let previous = self.store.hash_get(ASSIGNMENTS_KEY, &match_id.to_string()).await?;
        let target = self.elect(None).await?;
        self.record_assignment(match_id, &target).await?;
        self.notify(&target, match_id, previous).await?;

        info!("📌 Match {} assigned to instance {}", match_id, target);
        Ok(Assignment {
            match_id,
            instance_id: target,
            existing_owner: false,
        })
    }

    pub async fn record_assignment(&self, match_id: Uuid, instance_id: &str) -> Result<(), StoreError> {
        self.store
            .hash_set(ASSIGNMENTS_KEY, &match_id.to_string(), instance_id)
            .await
    }

    pub async fn clear_assignment(&self, match_id: Uuid) -> Result<(), StoreError> {
        self.store.hash_delete(ASSIGNMENTS_KEY, &match_id.to_string()).await
    }

    pub async fn assignments(&self) -> Result<HashMap<Uuid, String>, StoreError> {
        Ok(self
            .store
            .hash_get_all(ASSIGNMENTS_KEY)
            .await?
            .into_iter()
            .filter_map(|(match_id, instance_id)| {
                Uuid::parse_str(&match_id).ok().map(|id| (id, instance_id))
            })
            .collect())
    }

    pub async fn assignments_for(&self, instance_id: &str) -> Result<Vec<Uuid>, StoreError> {
        let mut matches: Vec<Uuid> = self
            .assignments()
            .await?
            .into_iter()
            .filter(|(_, owner)| owner == instance_id)
            .map(|(match_id, _)| match_id)
            .collect();
        matches.sort();
        Ok(matches)
    }

    /// Reassign matches of instances whose heartbeat expired. Only one
    /// instance sweeps per interval, and a match is only moved once its
    /// lease has expired too.
    pub async fn sweep_dead_instances(&self) -> Result<Vec<Reassignment>, BalancerError> {
        if !self
            .store
            .try_acquire(SWEEP_LEASE_KEY, &self.instance_id, self.sweep_ttl)
            .await?
        {
            return Ok(Vec::new());
        }

        let live = self.registry.live_instance_ids().await?;
        let mut reassignments = Vec::new();

        for (match_id, owner) in self.assignments().await? {
            if live.contains(&owner) {
                continue;
            }

            match self.store.get(&lease_key(match_id)).await? {
                Some(holder) if live.contains(&holder) => {
                    self.record_assignment(match_id, &holder).await?;
                    continue;
                }
                // Lease still running for a silent holder; wait for it to expire
                Some(_) => continue,
                None => {}
            }

            let target = match self.elect(Some(&owner)).await {
                Ok(target) => target,
                Err(BalancerError::NoHealthyInstance) => {
                    warn!("🚨 No healthy instance can take over match {} from {}", match_id, owner);
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.record_assignment(match_id, &target).await?;
            self.notify(&target, match_id, Some(owner.clone())).await?;
            warn!("🔁 Match {} reassigned from dead instance {} to {}", match_id, owner, target);
            reassignments.push(Reassignment {
                match_id,
                from_instance_id: owner,
                to_instance_id: target,
            });
        }

        for instance_id in self.registry.dead_instances().await? {
            self.registry.prune(&instance_id).await?;
        }

        Ok(reassignments)
    }

    pub async fn status(&self) -> Result<BalancerStatus, BalancerError> {
        let policy = self.policy().await;
        let thresholds = self.thresholds().await;
        let records = self.registry.live_instances().await?;

        let instances: Vec<InstanceHealth> = records
            .iter()
            .map(|record| {
                let (status, reasons) = thresholds.evaluate(&record.metrics);
                let status = if record.status == InstanceStatus::Degraded {
                    InstanceStatus::Degraded
                } else {
                    status
                };
                let reasons = if reasons.is_empty() {
                    record.degraded_reasons.clone()
                } else {
                    reasons
                };
                InstanceHealth {
                    instance_id: record.instance_id.clone(),
                    address: record.address.clone(),
                    healthy: status == InstanceStatus::Healthy,
                    status,
                    reasons,
                    connections: record.metrics.connections,
                    owned_matches: record.metrics.owned_matches,
                    connection_utilization: record.metrics.connection_utilization(),
                    cpu_percent: record.metrics.cpu_percent,
                    memory_percent: record.metrics.memory_percent,
                    error_rate: record.metrics.error_rate,
                    avg_response_time_ms: record.metrics.avg_response_time_ms,
                }
            })
            .collect();

        let healthy_instances = instances.iter().filter(|i| i.healthy).count();
        let total_connections = instances.iter().map(|i| i.connections).sum();
        let total_matches = instances.iter().map(|i| i.owned_matches).sum();
        let recommendations = recommendations(&records, &instances, healthy_instances);

        Ok(BalancerStatus {
            policy,
            thresholds,
            degraded_instances: instances.len() - healthy_instances,
            healthy_instances,
            total_connections,
            total_matches,
            instances,
            recommendations,
        })
    }

    async fn elect(&self, exclude: Option<&str>) -> Result<String, BalancerError> {
        let candidates: Vec<InstanceRecord> = self
            .healthy_instances()
            .await?
            .into_iter()
            .filter(|record| Some(record.instance_id.as_str()) != exclude)
            .collect();

        let policy = self.policy().await;
        let cursor = self.cursor.fetch_add(1, Ordering::SeqCst);
        policy
            .select(&candidates, cursor)
            .map(|record| record.instance_id.clone())
            .ok_or(BalancerError::NoHealthyInstance)
    }

    async fn notify(
        &self,
        instance_id: &str,
        match_id: Uuid,
        previous_instance_id: Option<String>,
    ) -> Result<(), StoreError> {
        let notice = AssignmentNotice {
            match_id,
            previous_instance_id,
        };
        let payload = serde_json::to_string(&notice)?;
        self.store.publish(&assignment_channel(instance_id), &payload).await?;
        Ok(())
    }
}

fn recommendations(records: &[InstanceRecord], instances: &[InstanceHealth], healthy: usize) -> Vec<String> {
    let mut recommendations = Vec::new();

    if instances.is_empty() {
        recommendations.push("No live instances are registered".to_string());
        return recommendations;
    }
    if healthy == 0 {
        recommendations.push("Every instance is degraded; scale out before assigning new matches".to_string());
    }

    let total_connections: usize = instances.iter().map(|i| i.connections).sum();
    let total_capacity: usize = records.iter().map(|r| r.metrics.max_connections).sum();
    if total_capacity > 0 {
        let utilization = total_connections as f64 / total_capacity as f64;
        if utilization > 0.7 {
            recommendations.push(format!(
                "Cluster connection utilization is {:.0}%; consider adding instances",
                utilization * 100.0
            ));
        }
    }

    if instances.len() > 1 && total_connections >= 10 {
        let mean = total_connections as f64 / instances.len() as f64;
        for instance in instances {
            if instance.connections as f64 > mean * 2.0 {
                recommendations.push(format!(
                    "Instance {} carries {} of {} connections; steer new matches elsewhere",
                    instance.instance_id, instance.connections, total_connections
                ));
            }
        }
    }

    for instance in instances.iter().filter(|i| !i.healthy) {
        recommendations.push(format!(
            "Instance {} is degraded ({}); it keeps its matches but gets no new ones",
            instance.instance_id,
            instance.reasons.join(", ")
        ));
    }

    recommendations
}
