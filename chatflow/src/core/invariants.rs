//! Semantic invariants not expressible via JSON Schema.

use crate::core::branches::enumerate;
use crate::core::codec::{check_len, stamp};
use crate::core::types::RoutingToken;
use crate::definition::{StepDefinition, Workflow};

/// Button field the router owns; authors must not set it.
pub const RESERVED_BUTTON_FIELD: &str = "callback_data";

/// Check semantic invariants of a workflow:
/// - Step names are non-empty and carry no surrounding whitespace
/// - Inline keyboards declare at least one button
/// - Buttons do not set the reserved `callback_data` field
/// - A first prompt's tokens fit `payload_limit_bytes`
pub fn validate_invariants(workflow: &Workflow, payload_limit_bytes: usize) -> Vec<String> {
    let mut errors = Vec::new();
    for (name, definition) in &workflow.steps {
        let name = name.as_str();
        if name.trim().is_empty() {
            errors.push("step name must not be empty".to_string());
        } else if name.trim() != name {
            errors.push(format!(
                "'{name}': step name must not have surrounding whitespace"
            ));
        }
        validate_step(name, definition, payload_limit_bytes, &mut errors);
    }
    errors
}

fn validate_step(
    name: &str,
    definition: &StepDefinition,
    payload_limit_bytes: usize,
    errors: &mut Vec<String>,
) {
    let branches = enumerate(definition);
    if definition.branching_enabled() && branches.is_empty() {
        errors.push(format!(
            "'{name}': inline_keyboard markup requires at least one button"
        ));
    }

    for branch in &branches {
        if branch.extra.contains_key(RESERVED_BUTTON_FIELD) {
            errors.push(format!(
                "'{name}': button {} sets reserved field '{RESERVED_BUTTON_FIELD}'",
                branch.index
            ));
        }
    }

    if let Some(last) = branches.last() {
        let token = stamp(&RoutingToken::default(), last.index);
        if let Err(err) = check_len(&token, payload_limit_bytes) {
            errors.push(format!("'{name}': {err}"));
        }
    }
}
