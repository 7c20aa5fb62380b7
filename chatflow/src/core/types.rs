//! Shared deterministic types for routing core logic.
//!
//! These types define stable contracts between the codec, collapser, resolver,
//! and dispatcher. They carry no I/O and are owned per unit of work.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output port that receives prompt responses and recorded failures.
pub const MAIN_OUTPUT: usize = 0;

/// Unique, stable name of a routing step within a workflow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepIdentity(String);

impl StepIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepIdentity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StepIdentity {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for StepIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Zero-based position of a branch in its step's flattened button list.
///
/// Output ports are offset by one: port `0` is [`MAIN_OUTPUT`], so branch `i`
/// leaves the step through port `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchIndex(usize);

impl BranchIndex {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn get(self) -> usize {
        self.0
    }

    /// Output port this branch forwards through.
    pub const fn output(self) -> usize {
        self.0 + 1
    }
}

impl fmt::Display for BranchIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Steps a unit has passed through since the last prompt was sent.
///
/// `path[i]` made the choice stored at `token[i]`.
pub type VisitedPath = Vec<StepIdentity>;

/// Flat, ordered branch choices from the start of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RoutingToken(Vec<BranchIndex>);

impl RoutingToken {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[BranchIndex] {
        &self.0
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

impl FromIterator<BranchIndex> for RoutingToken {
    fn from_iter<I: IntoIterator<Item = BranchIndex>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<&[usize]> for RoutingToken {
    fn from(choices: &[usize]) -> Self {
        choices.iter().copied().map(BranchIndex::new).collect()
    }
}

/// Outcome of resolving a unit against the current step.
///
/// `Resolved(BranchIndex::new(0))` is a real decision and never means "no answer".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    /// No recorded answer for this step: send a new prompt.
    Unresolved,
    /// Forward the unit to this branch.
    Resolved(BranchIndex),
}

/// One selectable action exposed by a step, rebuilt from configuration on
/// every evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub index: BranchIndex,
    /// Keyboard row the button was declared in.
    pub row: usize,
    pub label: String,
    /// Platform fields copied verbatim onto the outbound action.
    pub extra: Map<String, Value>,
}

/// A step on the visited path together with the branch it chose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub step: StepIdentity,
    pub choice: BranchIndex,
}

/// Named output port of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPort {
    pub index: usize,
    pub name: String,
}
