pub mod balancer;
pub mod health;
pub mod lease;
pub mod memory_store;
pub mod metrics;
pub mod node;
pub mod policy;
pub mod redis_store;
pub mod registry;
pub mod store;

pub use balancer::LoadBalancer;
pub use lease::LeaseManager;
pub use memory_store::InMemoryStateStore;
pub use node::{ClusterNode, NodeConfig};
pub use redis_store::RedisStateStore;
pub use store::{SharedStateStore, StoreError};
