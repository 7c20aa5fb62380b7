//! Branch enumeration: the single source of branch indices and step arity.

use crate::core::types::{Branch, BranchIndex, MAIN_OUTPUT, OutputPort};
use crate::definition::StepDefinition;

/// Flatten a step's rows of buttons into its ordered branches.
///
/// Row order first, then order within the row. Steps without an inline
/// keyboard have no branches.
pub fn enumerate(definition: &StepDefinition) -> Vec<Branch> {
    if !definition.branching_enabled() {
        return Vec::new();
    }
    definition
        .inline_keyboard
        .rows
        .iter()
        .enumerate()
        .flat_map(|(row, keyboard_row)| keyboard_row.buttons.iter().map(move |b| (row, b)))
        .enumerate()
        .map(|(index, (row, button))| Branch {
            index: BranchIndex::new(index),
            row,
            label: button.text.clone(),
            extra: button.extra.clone(),
        })
        .collect()
}

/// Output ports of a step: `main`, then one per branch.
///
/// Ports are named by the button label, or by the branch index when the label
/// is empty.
pub fn configured_outputs(definition: &StepDefinition) -> Vec<OutputPort> {
    let mut ports = vec![OutputPort {
        index: MAIN_OUTPUT,
        name: "main".to_string(),
    }];
    ports.extend(enumerate(definition).into_iter().map(|branch| OutputPort {
        index: branch.index.output(),
        name: if branch.label.is_empty() {
            branch.index.to_string()
        } else {
            branch.label
        },
    }));
    ports
}

/// Number of output ports, `main` included.
pub fn arity(definition: &StepDefinition) -> usize {
    configured_outputs(definition).len()
}
