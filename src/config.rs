pub mod cluster;
pub mod redis;
pub mod settings;
