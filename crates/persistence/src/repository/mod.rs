//! Repository implementations for database operations

pub mod strategy_results;

pub use strategy_results::*;
