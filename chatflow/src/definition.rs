//! Step and workflow definitions, as authored in a workflow file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::types::StepIdentity;

/// Whether a step exposes selectable branches at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMarkup {
    #[default]
    None,
    InlineKeyboard,
}

/// Text formatting the platform applies to a prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    Markdown,
    MarkdownV2,
    #[default]
    #[serde(rename = "HTML")]
    Html,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    #[serde(default)]
    pub rows: Vec<KeyboardRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyboardRow {
    #[serde(default)]
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Button {
    #[serde(default)]
    pub text: String,
    /// Extra platform fields (e.g. `url`), copied onto the outbound action.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Configuration of one routing step.
///
/// `chat_id`, `text`, and `edit_message_id` are templates rendered against
/// the unit's data when a prompt is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub chat_id: String,
    pub text: String,
    #[serde(default)]
    pub reply_markup: ReplyMarkup,
    #[serde(default)]
    pub inline_keyboard: InlineKeyboard,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
    /// When this renders to a positive message id, the prompt edits that
    /// message instead of sending a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
}

impl StepDefinition {
    pub fn branching_enabled(&self) -> bool {
        self.reply_markup == ReplyMarkup::InlineKeyboard
    }
}

/// Step registry of one conversation graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub steps: BTreeMap<StepIdentity, StepDefinition>,
}

impl Workflow {
    pub fn get(&self, step: &StepIdentity) -> Option<&StepDefinition> {
        self.steps.get(step)
    }
}
