//! Transport abstraction for the chat platform collaborator.
//!
//! The [`Transport`] trait decouples dispatch from the platform client that
//! actually sends messages and continues the workflow downstream. Tests use
//! recording transports that never touch the network.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::core::types::{BranchIndex, StepIdentity, VisitedPath};
use crate::io::prompt::PromptRequest;

/// A resolved unit handed to the collaborator continuing at a graph edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forward {
    pub step: StepIdentity,
    pub branch: BranchIndex,
    /// Output port, `branch + 1`.
    pub output: usize,
    pub path: VisitedPath,
    /// Unit data with the updated path written into it.
    pub data: Value,
}

/// Abstraction over chat platform backends.
pub trait Transport {
    /// Send or edit a prompt message. Returns the platform response, which
    /// becomes an item on the step's main output.
    fn send_prompt(&self, request: &PromptRequest) -> Result<Value>;

    /// Continue the workflow for a resolved unit.
    fn forward(&self, forward: &Forward) -> Result<()>;
}

/// Transport that answers every prompt with the request itself.
///
/// Used by the CLI to preview what a batch would send.
pub struct EchoTransport;

impl Transport for EchoTransport {
    #[instrument(skip_all, fields(step = %request.step, actions = request.actions.len()))]
    fn send_prompt(&self, request: &PromptRequest) -> Result<Value> {
        info!(chat_id = %request.chat_id, "echoing prompt");
        Ok(serde_json::to_value(request)?)
    }

    #[instrument(skip_all, fields(step = %forward.step, output = forward.output))]
    fn forward(&self, forward: &Forward) -> Result<()> {
        info!(path_len = forward.path.len(), "forwarding unit");
        Ok(())
    }
}
