use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

/// Payloads received on a subscribed channel, in publish order.
pub type MessageStream = Pin<Box<dyn Stream<Item = String> + Send>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("shared state store unavailable: {0}")]
    Unavailable(String),
    #[error("shared state store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Cross-instance coordination substrate: strongly consistent keys with TTL
/// and conditional set, plus an at-least-once publish/subscribe bus.
#[async_trait]
pub trait SharedStateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Set `key` to `holder` if it is absent or already held by `holder`
    /// (refreshing the TTL). Returns whether `holder` now owns the key.
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Extend the TTL only if `holder` still owns the key.
    async fn renew(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete the key only if `holder` owns it.
    async fn release(&self, key: &str, holder: &str) -> Result<bool, StoreError>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Returns the number of subscribers that received the message.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, StoreError>;

    /// The subscription is active once this returns; anything published
    /// afterwards is delivered on the stream.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, StoreError>;
}
