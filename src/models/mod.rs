pub mod common;
pub mod live_match;
pub mod match_events;
pub mod match_updates;
pub mod statistics;
