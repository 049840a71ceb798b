pub mod standings;
pub mod validation;
