//! Prompt request rendering for the transport.

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::types::StepIdentity;
use crate::definition::{ParseMode, StepDefinition};

/// One outbound action stamped with its routing token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StampedAction {
    /// Keyboard row the action belongs to.
    pub row: usize,
    pub label: String,
    /// Opaque action identifier; the transport must send it back verbatim.
    pub token: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Whether the prompt is a new message or replaces an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptMode {
    Send,
    Edit { message_id: i64 },
}

/// Everything the transport needs to send one prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptRequest {
    pub step: StepIdentity,
    pub chat_id: String,
    pub text: String,
    pub parse_mode: ParseMode,
    pub mode: PromptMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    pub actions: Vec<StampedAction>,
}

impl PromptRequest {
    /// Actions grouped back into keyboard rows, empty rows dropped.
    pub fn rows(&self) -> Vec<Vec<&StampedAction>> {
        let mut rows: Vec<Vec<&StampedAction>> = Vec::new();
        let mut current_row = None;
        for action in &self.actions {
            if current_row != Some(action.row) {
                rows.push(Vec::new());
                current_row = Some(action.row);
            }
            if let Some(row) = rows.last_mut() {
                row.push(action);
            }
        }
        rows
    }
}

/// Template engine wrapper around minijinja.
///
/// Missing data renders as empty text, including chained lookups such as
/// `{{ body.callback_query.from.id }}`.
pub struct PromptRenderer {
    env: Environment<'static>,
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        Self { env }
    }

    /// Render a step's prompt against a unit's data.
    pub fn render(
        &self,
        step: &StepIdentity,
        definition: &StepDefinition,
        data: &Value,
        actions: Vec<StampedAction>,
        default_parse_mode: ParseMode,
    ) -> Result<PromptRequest> {
        let chat_id = self.render_field("chat_id", &definition.chat_id, data)?;
        if chat_id.is_empty() {
            return Err(anyhow!("chat_id rendered empty"));
        }
        let text = self.render_field("text", &definition.text, data)?;
        let mode = match &definition.edit_message_id {
            Some(template) => {
                let rendered = self.render_field("edit_message_id", template, data)?;
                edit_mode(&rendered)
            }
            None => PromptMode::Send,
        };
        Ok(PromptRequest {
            step: step.clone(),
            chat_id,
            text,
            parse_mode: definition.parse_mode.unwrap_or(default_parse_mode),
            mode,
            reply_to_message_id: definition.reply_to_message_id.filter(|id| *id > 0),
            actions,
        })
    }

    fn render_field(&self, field: &str, template: &str, data: &Value) -> Result<String> {
        let rendered = self
            .env
            .render_str(template, data)
            .with_context(|| format!("render {field}"))?;
        Ok(rendered.trim().to_string())
    }
}

/// Positive message ids edit that message; anything else sends a new one.
fn edit_mode(rendered: &str) -> PromptMode {
    match rendered.parse::<i64>() {
        Ok(message_id) if message_id > 0 => PromptMode::Edit { message_id },
        _ => PromptMode::Send,
    }
}
