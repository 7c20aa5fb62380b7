//! I/O helpers for dispatch commands.

pub mod config;
pub mod prompt;
pub mod transport;
pub mod units;
pub mod workflow_store;
