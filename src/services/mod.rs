pub mod broadcaster;
pub mod match_engine;
pub mod match_queries;
pub mod scheduler;

pub use broadcaster::{Broadcaster, LiveFeed, ViewerRole, ViewerSubscription};
pub use match_engine::MatchEngine;
pub use match_queries::MatchQueryService;
pub use scheduler::ClusterScheduler;
