//! Inbound unit loading and platform event extraction.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::types::{StepIdentity, VisitedPath};

/// One item of work evaluated by a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundUnit {
    /// Step currently evaluating the unit.
    pub step: StepIdentity,
    /// Steps visited since the last prompt, as recorded on the unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_path: Option<VisitedPath>,
    /// Encoded token carried from a prior prompt's metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_token: Option<String>,
    /// Encoded token from the button press that produced this unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Unit payload; templates render against it.
    #[serde(default)]
    pub data: Value,
}

impl InboundUnit {
    pub fn new(step: impl Into<StepIdentity>) -> Self {
        Self {
            step: step.into(),
            prior_path: None,
            prior_token: None,
            event: None,
            data: Value::Null,
        }
    }

    /// Raw token to decode: the inbound event, else the carried token.
    pub fn raw_token(&self) -> Option<&str> {
        self.event.as_deref().or(self.prior_token.as_deref())
    }
}

/// Read the button-press data from a platform update.
///
/// Accepts the update itself or one wrapped in a webhook `body`.
pub fn extract_event_token(update: &Value) -> Option<String> {
    ["/callback_query/data", "/body/callback_query/data"]
        .iter()
        .find_map(|pointer| update.pointer(pointer))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Visited path a forward wrote into unit data under `field`.
///
/// A field that is present but not a list of step names is logged and
/// ignored.
pub fn recorded_path(data: &Value, field: &str) -> Option<VisitedPath> {
    let recorded = data.get(field)?;
    match serde_json::from_value(recorded.clone()) {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(field, %err, "ignoring malformed recorded path");
            None
        }
    }
}

/// Load a JSON array of units. Units without an explicit `event` take it
/// from a platform update found in their data.
pub fn load_units(path: &Path) -> Result<Vec<InboundUnit>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read units {}", path.display()))?;
    let mut units: Vec<InboundUnit> = serde_json::from_str(&contents)
        .with_context(|| format!("parse units {}", path.display()))?;
    for unit in &mut units {
        if unit.event.is_none() {
            unit.event = extract_event_token(&unit.data);
        }
    }
    debug!(count = units.len(), "units loaded");
    Ok(units)
}
