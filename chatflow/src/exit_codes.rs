//! Stable exit codes for chatflow CLI commands.

/// Command succeeded and every unit was routed.
pub const OK: i32 = 0;
/// Invalid workflow, config, or units file, or a batch aborted on a failing unit.
pub const INVALID: i32 = 1;
/// `chatflow dispatch` finished but at least one unit failed.
pub const FAILED_UNITS: i32 = 2;
