use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use matchday_live::cluster::store::MessageStream;
use matchday_live::cluster::{ClusterNode, InMemoryStateStore, SharedStateStore, StoreError};
use matchday_live::db::match_repository::MatchRepository;

use super::cluster_helpers::test_config;

/// Shared state store that delegates to an in-memory one but can be told to
/// answer slowly or to lose its match subscriptions, like a flaky Redis.
pub struct FaultyStore {
    inner: Arc<InMemoryStateStore>,
    acquire_delay_ms: AtomicU64,
    subscribe_delay_ms: AtomicU64,
    // 0 keeps match streams open
    match_stream_limit: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryStateStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            acquire_delay_ms: AtomicU64::new(0),
            subscribe_delay_ms: AtomicU64::new(0),
            match_stream_limit: AtomicUsize::new(0),
        })
    }

    /// The lease is stamped by the store only after this delay.
    pub fn delay_acquire(&self, delay: Duration) {
        self.acquire_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn delay_subscribe(&self, delay: Duration) {
        self.subscribe_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Match event streams end after delivering `messages` payloads.
    pub fn drop_match_streams_after(&self, messages: usize) {
        self.match_stream_limit.store(messages, Ordering::SeqCst);
    }

    async fn pause(delay_ms: &AtomicU64) {
        let delay = delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

pub fn spawn_node_on(
    store: Arc<FaultyStore>,
    repository: Arc<dyn MatchRepository>,
    instance_id: &str,
) -> Arc<ClusterNode> {
    ClusterNode::new(test_config(instance_id), store, repository)
}

#[async_trait]
impl SharedStateStore for FaultyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        Self::pause(&self.acquire_delay_ms).await;
        self.inner.try_acquire(key, holder, ttl).await
    }

    async fn renew(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.renew(key, holder, ttl).await
    }

    async fn release(&self, key: &str, holder: &str) -> Result<bool, StoreError> {
        self.inner.release(key, holder).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.inner.hash_set(key, field, value).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.inner.hash_get(key, field).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.inner.hash_get_all(key).await
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError> {
        self.inner.hash_delete(key, field).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.set_members(key).await
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, StoreError> {
        self.inner.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, StoreError> {
        Self::pause(&self.subscribe_delay_ms).await;
        let stream = self.inner.subscribe(channel).await?;
        let limit = self.match_stream_limit.load(Ordering::SeqCst);
        if limit > 0 && channel.starts_with("match:events:") {
            return Ok(Box::pin(stream.take(limit)));
        }
        Ok(stream)
    }
}
