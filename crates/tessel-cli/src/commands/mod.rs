//! CLI command implementations.

pub mod bake;
pub mod common;
pub mod config;
pub mod nodes;
pub mod order;
