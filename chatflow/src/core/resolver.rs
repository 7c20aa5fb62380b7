//! Completion resolution: has this step already been answered, and how?
//!
//! The wire token is a flat list of choices with no step names in it, so it
//! is bound to the visited path exactly once, here, into a [`Trail`] of
//! explicit `(step, choice)` hops. Whatever the path does not account for is
//! the pending answer for the step currently evaluating the unit.

use crate::core::types::{BranchIndex, Hop, RoutingDecision, RoutingToken, StepIdentity};

/// A visited path bound to the routing token it travelled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trail {
    hops: Vec<Hop>,
    /// Path entries with no matching choice in the token.
    unbound: Vec<StepIdentity>,
    /// Token choices beyond the visited path, nearest step first.
    pending: Vec<BranchIndex>,
}

impl Trail {
    /// Pair `path[i]` with `token[i]`.
    pub fn bind(path: &[StepIdentity], token: &RoutingToken) -> Self {
        let choices = token.as_slice();
        let bound = path.len().min(choices.len());
        let hops = path
            .iter()
            .zip(choices)
            .map(|(step, choice)| Hop {
                step: step.clone(),
                choice: *choice,
            })
            .collect();
        Self {
            hops,
            unbound: path[bound..].to_vec(),
            pending: choices[bound..].to_vec(),
        }
    }

    /// Number of steps already consumed from the token.
    pub fn depth(&self) -> usize {
        self.hops.len()
    }

    /// True when every visited step has a recorded choice.
    pub fn is_bound(&self) -> bool {
        self.unbound.is_empty()
    }

    /// Choices consumed by the visited path; the prefix every outbound action
    /// of a new prompt extends.
    pub fn consumed(&self) -> RoutingToken {
        self.hops.iter().map(|hop| hop.choice).collect()
    }

    /// Decision for the step evaluating the unit.
    pub fn decision(&self) -> RoutingDecision {
        if !self.is_bound() {
            return RoutingDecision::Unresolved;
        }
        match self.pending.first() {
            Some(choice) => RoutingDecision::Resolved(*choice),
            None => RoutingDecision::Unresolved,
        }
    }
}

/// Decide whether the step at depth `path.len()` already has an answer.
///
/// An empty token is always unresolved (nothing was ever answered). Otherwise
/// the answer is `token[path.len()]`, or unresolved when out of range.
pub fn resolve(token: &RoutingToken, path: &[StepIdentity]) -> RoutingDecision {
    if token.is_empty() {
        return RoutingDecision::Unresolved;
    }
    Trail::bind(path, token).decision()
}
