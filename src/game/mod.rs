pub mod reorder;
pub mod stats_calculator;
