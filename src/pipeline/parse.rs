//! Dish parser: menu text → recommended [`DishRecord`]s via a chat model.
//!
//! The model is asked for either the literal `ERROR` token or a bare JSON
//! array. Models still wrap JSON in a ```` ```json ```` fence now and then, so
//! the reply goes through three deterministic steps:
//!
//! 1. `ERROR` (after trimming) → [`MenuError::NotAMenu`]
//! 2. strip one optional fenced code block, keep its inner content
//! 3. decode as a non-empty JSON array of `{name, description}` objects,
//!    otherwise [`MenuError::MalformedResponse`]
//!
//! No further heuristics are attempted after the fence strip.

use crate::error::MenuError;
use crate::menu::{DishRecord, ExtractedText};
use crate::pipeline::llm::ChatCompletion;
use crate::prompts::{MENU_SYSTEM_PROMPT, NOT_A_MENU_TOKEN};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sends menu text to a chat model and decodes the recommended dishes.
pub struct DishParser {
    chat: Arc<dyn ChatCompletion>,
    system_prompt: String,
    max_dishes: usize,
}

impl DishParser {
    pub fn new(chat: Arc<dyn ChatCompletion>, max_dishes: usize) -> Self {
        Self {
            chat,
            system_prompt: MENU_SYSTEM_PROMPT.to_string(),
            max_dishes,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Ask the model for dishes and decode its reply.
    ///
    /// Blank text never reaches the model: an empty page is not a menu.
    pub async fn parse_dishes(&self, text: &ExtractedText) -> Result<Vec<DishRecord>, MenuError> {
        if text.is_blank() {
            debug!("Extracted text is blank; skipping chat call");
            return Err(MenuError::NotAMenu);
        }

        let reply = self.chat.complete(&self.system_prompt, text.as_str()).await?;
        let dishes = interpret_response(&reply, self.max_dishes)?;
        info!("Parsed {} dishes from menu text", dishes.len());
        Ok(dishes)
    }
}

/// Decode a raw model reply into dish records.
///
/// More than `max_dishes` records are truncated to the first `max_dishes`;
/// fewer are returned as-is.
pub fn interpret_response(reply: &str, max_dishes: usize) -> Result<Vec<DishRecord>, MenuError> {
    let trimmed = reply.trim();
    if trimmed == NOT_A_MENU_TOKEN {
        return Err(MenuError::NotAMenu);
    }

    let body = strip_code_fence(trimmed);
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| MenuError::MalformedResponse {
            detail: format!("not valid JSON: {e}"),
        })?;

    let items = match value {
        serde_json::Value::Array(items) if !items.is_empty() => items,
        serde_json::Value::Array(_) => {
            return Err(MenuError::MalformedResponse {
                detail: "empty dish array".into(),
            })
        }
        other => {
            return Err(MenuError::MalformedResponse {
                detail: format!("expected a JSON array, got {}", json_kind(&other)),
            })
        }
    };

    let mut dishes = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| decode_dish(i, item))
        .collect::<Result<Vec<_>, _>>()?;

    if dishes.len() > max_dishes {
        warn!(
            "Model returned {} dishes; keeping the first {}",
            dishes.len(),
            max_dishes
        );
        dishes.truncate(max_dishes);
    } else if dishes.len() < max_dishes {
        debug!("Model returned {} of {} dishes", dishes.len(), max_dishes);
    }

    Ok(dishes)
}

fn decode_dish(index: usize, item: serde_json::Value) -> Result<DishRecord, MenuError> {
    let dish: DishRecord =
        serde_json::from_value(item).map_err(|e| MenuError::MalformedResponse {
            detail: format!("dish {index}: {e}"),
        })?;
    if dish.name.trim().is_empty() {
        return Err(MenuError::MalformedResponse {
            detail: format!("dish {index}: empty name"),
        });
    }
    Ok(dish)
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// ── Fence stripping ──────────────────────────────────────────────────────────

static RE_FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)(?:```|$)").unwrap());

/// Return the inner content of the first fenced code block, or the input
/// unchanged when there is no fence.
pub fn strip_code_fence(input: &str) -> &str {
    match RE_FENCED_BLOCK.captures(input) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim(),
        None => input,
    }
}
