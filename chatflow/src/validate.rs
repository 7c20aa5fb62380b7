//! Validation of a workflow file together with its dispatch config.

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::branches::arity;
use crate::core::types::StepIdentity;
use crate::definition::Workflow;
use crate::io::config::{DispatchConfig, load_config};
use crate::io::workflow_store::load_workflow;

/// What a valid workflow looks like to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateOutcome {
    /// Each step with its number of output ports.
    pub steps: Vec<(StepIdentity, usize)>,
}

/// Load config (defaults when `config` is absent or missing), then load the
/// workflow against the configured payload limit.
pub fn load_inputs(workflow: &Path, config: Option<&Path>) -> Result<(Workflow, DispatchConfig)> {
    let config = match config {
        Some(path) => load_config(path).with_context(|| format!("load config {}", path.display()))?,
        None => DispatchConfig::default(),
    };
    let workflow = load_workflow(workflow, config.payload_limit_bytes)?;
    Ok((workflow, config))
}

/// Validate schema, invariants, and config.
pub fn validate_workflow(workflow: &Path, config: Option<&Path>) -> Result<ValidateOutcome> {
    let (workflow, _) = load_inputs(workflow, config)?;
    let steps = workflow
        .steps
        .iter()
        .map(|(step, definition)| (step.clone(), arity(definition)))
        .collect();
    Ok(ValidateOutcome { steps })
}
