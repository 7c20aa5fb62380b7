//! Deterministic, pure routing logic.
//!
//! Core modules must be free of I/O side effects. They operate on unit-local
//! values and return deterministic outputs suitable for tests.

pub mod branches;
pub mod codec;
pub mod collapse;
pub mod invariants;
pub mod resolver;
pub mod types;
