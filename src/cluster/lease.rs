use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cluster::store::{SharedStateStore, StoreError};

pub fn lease_key(match_id: Uuid) -> String {
    format!("match:lease:{}", match_id)
}

/// Outcome of one renewal round
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LeaseRenewal {
    pub renewed: Vec<Uuid>,
    pub lost: Vec<Uuid>,
}

/// Ownership leases held by this instance.
///
/// Each held lease carries a local deadline computed from the moment the
/// acquire/renew request was *sent*, so the local view always expires no
/// later than the store's. Once the deadline passes the lease is treated as
/// lost even if the store was never reachable to confirm it.
pub struct LeaseManager {
    store: Arc<dyn SharedStateStore>,
    instance_id: String,
    ttl: Duration,
    request_timeout: Duration,
    held: Mutex<HashMap<Uuid, Instant>>,
}

impl LeaseManager {
    pub fn new(
        store: Arc<dyn SharedStateStore>,
        instance_id: impl Into<String>,
        ttl: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            instance_id: instance_id.into(),
            ttl,
            request_timeout,
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Succeeds when the lease is free, expired, or already ours.
    pub async fn acquire(&self, match_id: Uuid) -> Result<bool, StoreError> {
        let requested_at = Instant::now();
        let acquired = self
            .bounded(self.store.try_acquire(&lease_key(match_id), &self.instance_id, self.ttl))
            .await?;

        if acquired {
            self.held.lock().await.insert(match_id, requested_at + self.ttl);
            info!("🔒 Instance {} acquired lease for match {}", self.instance_id, match_id);
        } else {
            debug!("Lease for match {} is held elsewhere", match_id);
        }
        Ok(acquired)
    }

    /// Local, fail-closed check used before every mutation.
    pub async fn is_held(&self, match_id: Uuid) -> bool {
        let now = Instant::now();
        self.held
            .lock()
            .await
            .get(&match_id)
            .is_some_and(|deadline| *deadline > now)
    }

    pub async fn renew(&self, match_id: Uuid) -> Result<bool, StoreError> {
        let requested_at = Instant::now();
        let renewed = self
            .bounded(self.store.renew(&lease_key(match_id), &self.instance_id, self.ttl))
            .await?;

        let mut held = self.held.lock().await;
        if renewed {
            held.insert(match_id, requested_at + self.ttl);
        } else {
            held.remove(&match_id);
        }
        Ok(renewed)
    }

    /// Renew every held lease. A lease whose renewal fails is kept only
    /// until its local deadline passes; one already past it is never renewed.
    pub async fn renew_all(&self) -> LeaseRenewal {
        let mut outcome = LeaseRenewal::default();
        let match_ids: Vec<Uuid> = {
            let now = Instant::now();
            let mut held = self.held.lock().await;
            let expired: Vec<Uuid> = held
                .iter()
                .filter(|(_, deadline)| **deadline <= now)
                .map(|(match_id, _)| *match_id)
                .collect();
            for match_id in expired {
                held.remove(&match_id);
                warn!("⌛ Lease for match {} expired locally before renewal", match_id);
                outcome.lost.push(match_id);
            }
            held.keys().copied().collect()
        };

        for match_id in match_ids {
            match self.renew(match_id).await {
                Ok(true) => outcome.renewed.push(match_id),
                Ok(false) => {
                    warn!("⚠️ Lease for match {} was taken over; giving up ownership", match_id);
                    outcome.lost.push(match_id);
                }
                Err(e) => {
                    warn!("⚠️ Failed to renew lease for match {}: {}", match_id, e);
                    let now = Instant::now();
                    let mut held = self.held.lock().await;
                    if held.get(&match_id).is_some_and(|deadline| *deadline <= now) {
                        held.remove(&match_id);
                        outcome.lost.push(match_id);
                    }
                }
            }
        }
        outcome
    }

    pub async fn release(&self, match_id: Uuid) -> Result<bool, StoreError> {
        self.held.lock().await.remove(&match_id);
        let released = self
            .bounded(self.store.release(&lease_key(match_id), &self.instance_id))
            .await?;
        if released {
            info!("🔓 Instance {} released lease for match {}", self.instance_id, match_id);
        }
        Ok(released)
    }

    pub async fn release_all(&self) -> Vec<Uuid> {
        let match_ids: Vec<Uuid> = self.held.lock().await.keys().copied().collect();
        let mut released = Vec::new();
        for match_id in match_ids {
            match self.release(match_id).await {
                Ok(_) => released.push(match_id),
                Err(e) => warn!("Failed to release lease for match {}: {}", match_id, e),
            }
        }
        released
    }

    /// Forget a lease locally without touching the store.
    pub async fn forget(&self, match_id: Uuid) {
        self.held.lock().await.remove(&match_id);
    }

    pub async fn current_holder(&self, match_id: Uuid) -> Result<Option<String>, StoreError> {
        self.bounded(self.store.get(&lease_key(match_id))).await
    }

    /// Matches whose lease has not locally expired
    pub async fn held_matches(&self) -> Vec<Uuid> {
        let now = Instant::now();
        let mut held: Vec<Uuid> = self
            .held
            .lock()
            .await
            .iter()
            .filter(|(_, deadline)| **deadline > now)
            .map(|(match_id, _)| *match_id)
            .collect();
        held.sort();
        held
    }

    async fn bounded<T, F>(&self, request: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        timeout(self.request_timeout, request)
            .await
            .map_err(|_| StoreError::Timeout(self.request_timeout))?
    }
}
