//! Test-only helpers for building steps, units, and transports.

use std::cell::{Cell, RefCell};

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::core::types::StepIdentity;
use crate::definition::{
    Button, InlineKeyboard, KeyboardRow, ReplyMarkup, StepDefinition, Workflow,
};
use crate::io::prompt::PromptRequest;
use crate::io::transport::{Forward, Transport};
use crate::io::units::InboundUnit;

/// Step without branches that sends "{{ text }}" to "{{ chat_id }}".
pub fn plain_step() -> StepDefinition {
    StepDefinition {
        chat_id: "{{ chat_id }}".to_string(),
        text: "{{ text }}".to_string(),
        reply_markup: ReplyMarkup::None,
        inline_keyboard: InlineKeyboard::default(),
        parse_mode: None,
        edit_message_id: None,
        reply_to_message_id: None,
    }
}

/// Branching step with one keyboard row per entry of `rows`.
pub fn step_with_rows(rows: &[&[&str]]) -> StepDefinition {
    StepDefinition {
        reply_markup: ReplyMarkup::InlineKeyboard,
        inline_keyboard: InlineKeyboard {
            rows: rows
                .iter()
                .map(|labels| KeyboardRow {
                    buttons: labels
                        .iter()
                        .map(|label| Button {
                            text: label.to_string(),
                            ..Button::default()
                        })
                        .collect(),
                })
                .collect(),
        },
        ..plain_step()
    }
}

/// Branching step with all buttons in a single row.
pub fn step_with_buttons(labels: &[&str]) -> StepDefinition {
    step_with_rows(&[labels])
}

pub fn workflow(steps: Vec<(&str, StepDefinition)>) -> Workflow {
    Workflow {
        steps: steps
            .into_iter()
            .map(|(name, definition)| (StepIdentity::from(name), definition))
            .collect(),
    }
}

/// Unit for `step` in chat 1, with an optional button press and prior path.
pub fn unit(step: &str, event: Option<&str>, path: &[&str]) -> InboundUnit {
    InboundUnit {
        step: StepIdentity::from(step),
        prior_path: if path.is_empty() {
            None
        } else {
            Some(path.iter().map(|name| StepIdentity::from(*name)).collect())
        },
        prior_token: None,
        event: event.map(str::to_string),
        data: json!({"chat_id": 1, "text": format!("at {step}")}),
    }
}

/// Transport that records every call and fails on scripted call numbers.
///
/// Calls are counted across `send_prompt` and `forward`, starting at 0.
#[derive(Default)]
pub struct RecordingTransport {
    pub prompts: RefCell<Vec<PromptRequest>>,
    pub forwards: RefCell<Vec<Forward>>,
    fail_calls: Vec<usize>,
    calls: Cell<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(calls: &[usize]) -> Self {
        Self {
            fail_calls: calls.to_vec(),
            ..Self::default()
        }
    }

    /// Tokens of the most recent prompt's actions.
    pub fn last_tokens(&self) -> Vec<String> {
        self.prompts
            .borrow()
            .last()
            .map(|prompt| prompt.actions.iter().map(|a| a.token.clone()).collect())
            .unwrap_or_default()
    }

    fn next_call(&self) -> Result<()> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if self.fail_calls.contains(&call) {
            return Err(anyhow!("scripted transport failure on call {call}"));
        }
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn send_prompt(&self, request: &PromptRequest) -> Result<Value> {
        self.next_call()?;
        self.prompts.borrow_mut().push(request.clone());
        Ok(json!({"ok": true, "chat_id": request.chat_id, "text": request.text}))
    }

    fn forward(&self, forward: &Forward) -> Result<()> {
        self.next_call()?;
        self.forwards.borrow_mut().push(forward.clone());
        Ok(())
    }
}
