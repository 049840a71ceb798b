#![allow(dead_code)]

pub mod cluster_helpers;
pub mod faulty_store;
pub mod utils;
