//! Workflow load/save helpers with schema + invariant validation.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use jsonschema::Validator;
use serde_json::Value;
use tracing::debug;

use crate::core::invariants::validate_invariants;
use crate::definition::Workflow;

/// Bundled JSON Schema for workflow files.
pub const WORKFLOW_SCHEMA: &str = include_str!("../../schemas/workflow.schema.json");

static WORKFLOW_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(WORKFLOW_SCHEMA).expect("bundled workflow schema should be JSON");
    jsonschema::validator_for(&schema).expect("bundled workflow schema should compile")
});

/// Parse and validate a workflow document: schema conformance + invariants.
pub fn parse_workflow(raw: &str, payload_limit_bytes: usize) -> Result<Workflow> {
    let value: Value = serde_json::from_str(raw).context("parse workflow json")?;
    validate_schema(&value)?;
    let workflow: Workflow =
        serde_json::from_value(value).context("deserialize workflow")?;
    let errors = validate_invariants(&workflow, payload_limit_bytes);
    if !errors.is_empty() {
        return Err(anyhow!("workflow invariants failed: {}", errors.join("; ")));
    }
    Ok(workflow)
}

/// Load and validate a workflow from disk.
pub fn load_workflow(path: &Path, payload_limit_bytes: usize) -> Result<Workflow> {
    debug!(path = %path.display(), "loading workflow");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read workflow {}", path.display()))?;
    let workflow = parse_workflow(&contents, payload_limit_bytes)
        .with_context(|| format!("load workflow {}", path.display()))?;
    debug!(steps = workflow.steps.len(), "workflow loaded");
    Ok(workflow)
}

/// Write a workflow as pretty-printed JSON with trailing newline.
pub fn write_workflow(path: &Path, workflow: &Workflow) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(workflow)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write workflow {}", path.display()))
}

fn validate_schema(value: &Value) -> Result<()> {
    let messages: Vec<String> = WORKFLOW_VALIDATOR
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "workflow schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
