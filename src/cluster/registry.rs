use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cluster::store::{SharedStateStore, StoreError};

pub const INSTANCES_INDEX_KEY: &str = "instances:index";

pub fn instance_key(instance_id: &str) -> String {
    format!("instances:{}", instance_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Healthy,
    Degraded,
}

/// Load figures carried by every heartbeat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetrics {
    pub connections: usize,
    pub max_connections: usize,
    pub owned_matches: usize,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
}

impl InstanceMetrics {
    pub fn connection_utilization(&self) -> f64 {
        if self.max_connections == 0 {
            return 0.0;
        }
        self.connections as f64 / self.max_connections as f64
    }
}

/// Registry entry written by an instance's heartbeat. It disappears when the
/// heartbeats stop and its TTL runs out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub address: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub degraded_reasons: Vec<String>,
    pub metrics: InstanceMetrics,
    pub owned_matches: Vec<Uuid>,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Clone)]
pub struct InstanceRegistry {
    store: Arc<dyn SharedStateStore>,
    ttl: Duration,
}

impl InstanceRegistry {
    pub fn new(store: Arc<dyn SharedStateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn heartbeat(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        self.store
            .set_with_ttl(&instance_key(&record.instance_id), &payload, self.ttl)
            .await?;
        self.store.set_add(INSTANCES_INDEX_KEY, &record.instance_id).await?;
        debug!(
            "💓 Heartbeat from {}: {} connections, {} matches, {:?}",
            record.instance_id, record.metrics.connections, record.metrics.owned_matches, record.status
        );
        Ok(())
    }

    pub async fn fetch(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StoreError> {
        match self.store.get(&instance_key(instance_id)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Instances whose heartbeat has not expired, ordered by id.
    pub async fn live_instances(&self) -> Result<Vec<InstanceRecord>, StoreError> {
        let mut live = Vec::new();
        for instance_id in self.store.set_members(INSTANCES_INDEX_KEY).await? {
            if let Some(record) = self.fetch(&instance_id).await? {
                live.push(record);
            }
        }
        live.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        Ok(live)
    }

    pub async fn live_instance_ids(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .live_instances()
            .await?
            .into_iter()
            .map(|record| record.instance_id)
            .collect())
    }

    /// Indexed instances whose heartbeat has expired.
    pub async fn dead_instances(&self) -> Result<Vec<String>, StoreError> {
        let mut dead = Vec::new();
        for instance_id in self.store.set_members(INSTANCES_INDEX_KEY).await? {
            if self.store.get(&instance_key(&instance_id)).await?.is_none() {
                dead.push(instance_id);
            }
        }
        Ok(dead)
    }

    pub async fn prune(&self, instance_id: &str) -> Result<(), StoreError> {
        self.store.set_remove(INSTANCES_INDEX_KEY, instance_id).await?;
        info!("🧹 Pruned dead instance {} from the registry", instance_id);
        Ok(())
    }

    pub async fn deregister(&self, instance_id: &str) -> Result<(), StoreError> {
        self.store.delete(&instance_key(instance_id)).await?;
        self.store.set_remove(INSTANCES_INDEX_KEY, instance_id).await?;
        info!("👋 Instance {} deregistered", instance_id);
        Ok(())
    }
}
