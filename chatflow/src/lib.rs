//! Branch routing for chat workflows driven by inline-keyboard prompts.
//!
//! A step either forwards a unit down the branch a user already picked, or
//! sends a prompt whose buttons carry compact routing tokens. Tokens record
//! one choice per visited step, so a button press can be routed back through
//! every step it crosses without server-side state.
//!
//! - **[`core`]**: Pure routing logic (token codec, loop collapse, resolution,
//!   branch enumeration, workflow invariants). No I/O.
//! - **[`io`]**: Config, workflow files, units, prompt rendering, and the
//!   [`io::transport::Transport`] seam to the chat platform.
//!
//! [`dispatch`] and [`validate`] coordinate the two to implement CLI commands.

pub mod core;
pub mod definition;
pub mod dispatch;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
