pub mod backend_health_handler;
pub mod match_handler;
pub mod ops_handler;
pub mod season_handler;
