//! Routing error taxonomy.

use thiserror::Error;

use crate::core::types::StepIdentity;

/// Per-unit routing failures.
///
/// `MalformedToken` is recovered inside the dispatcher (the unit is treated as
/// unresolved); every other variant fails the unit it was raised for.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("malformed routing token '{raw}': {reason}")]
    MalformedToken { raw: String, reason: String },

    #[error("unknown step '{0}'")]
    UnknownStep(StepIdentity),

    #[error("routing token is {len} bytes, limit is {limit}")]
    PayloadTooLarge { len: usize, limit: usize },

    #[error("render prompt for step '{step}': {message}")]
    Render { step: StepIdentity, message: String },

    #[error("transport failed for step '{step}': {message}")]
    Transport { step: StepIdentity, message: String },
}

impl RoutingError {
    pub(crate) fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        Self::MalformedToken {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}
