use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;

use crate::cluster::store::{MessageStream, SharedStateStore, StoreError};

const CHANNEL_CAPACITY: usize = 1024;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

#[derive(Default)]
struct State {
    values: HashMap<String, Entry>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

impl State {
    /// Expired keys are purged lazily, on the next access.
    fn live_value(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.values.get(key).is_some_and(|entry| !entry.is_live(now)) {
            self.values.remove(key);
        }
        self.values.get_mut(key)
    }
}

/// Single-process stand-in for Redis. TTLs follow tokio's clock, so tests
/// can pause and advance time to expire leases and heartbeats. Several
/// cluster nodes in one test share one instance to simulate a cluster.
#[derive(Default)]
pub struct InMemoryStateStore {
    state: Mutex<State>,
    partitioned: AtomicBool,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While partitioned every operation fails as if the store were unreachable.
    pub fn set_partitioned(&self, partitioned: bool) {
        self.partitioned.store(partitioned, Ordering::SeqCst);
    }

    fn ensure_reachable(&self) -> Result<(), StoreError> {
        if self.partitioned.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("network partition".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedStateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_reachable()?;
        let mut state = self.state.lock().await;
        Ok(state.live_value(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        self.state.lock().await.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        self.state.lock().await.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        let mut state = self.state.lock().await;
        state.values.remove(key);
        state.hashes.remove(key);
        state.sets.remove(key);
        Ok(())
    }

    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.ensure_reachable()?;
        let mut state = self.state.lock().await;
        let deadline = Instant::now() + ttl;
        match state.live_value(key) {
            Some(entry) if entry.value == holder => {
                entry.expires_at = Some(deadline);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                state.values.insert(
                    key.to_string(),
                    Entry {
                        value: holder.to_string(),
                        expires_at: Some(deadline),
                    },
                );
                Ok(true)
            }
        }
    }

    async fn renew(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.ensure_reachable()?;
        let mut state = self.state.lock().await;
        match state.live_value(key) {
            Some(entry) if entry.value == holder => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, holder: &str) -> Result<bool, StoreError> {
        self.ensure_reachable()?;
        let mut state = self.state.lock().await;
        let owned = state.live_value(key).is_some_and(|entry| entry.value == holder);
        if owned {
            state.values.remove(key);
        }
        Ok(owned)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        self.state
            .lock()
            .await
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.ensure_reachable()?;
        let state = self.state.lock().await;
        Ok(state.hashes.get(key).and_then(|hash| hash.get(field)).cloned())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.ensure_reachable()?;
        let state = self.state.lock().await;
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        if let Some(hash) = self.state.lock().await.hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        self.state
            .lock()
            .await
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        if let Some(set) = self.state.lock().await.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_reachable()?;
        let state = self.state.lock().await;
        let mut members: Vec<String> = state
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, StoreError> {
        self.ensure_reachable()?;
        let state = self.state.lock().await;
        Ok(state
            .channels
            .get(channel)
            .and_then(|sender| sender.send(payload.to_string()).ok())
            .unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, StoreError> {
        self.ensure_reachable()?;
        let receiver = self
            .state
            .lock()
            .await
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let stream = BroadcastStream::new(receiver).filter_map(|message| async move { message.ok() });
        Ok(Box::pin(stream))
    }
}
