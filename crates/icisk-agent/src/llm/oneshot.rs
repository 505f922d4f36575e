//! One-shot LLM helpers for prompt generation and response interpretation.
//!
//! The interrupt handlers talk to the LLM outside the main conversation:
//! once to phrase a question for the user, and once to interpret the
//! user's free-form answer as structured data.

use serde_json::Value;

use crate::error::Error;
use crate::llm::types::{CompletionRequest, Message};
use crate::llm::DynLlmProvider;

/// Single question, single text answer. No tools, no history.
pub async fn ask(
    provider: &dyn DynLlmProvider,
    system: &str,
    message: &str,
) -> Result<String, Error> {
    let request = CompletionRequest {
        system: system.to_string(),
        messages: vec![Message::user(message)],
        tools: vec![],
        tool_choice: None,
        max_tokens: 2048,
    };
    let response = provider.complete_dyn(request).await?;
    Ok(response.text())
}

/// Like [`ask`] but interprets the answer as JSON.
///
/// Returns `Ok(None)` when the model answered with `None`/`null`,
/// which the interrupt handlers treat as "the user wants to abort".
pub async fn ask_json(
    provider: &dyn DynLlmProvider,
    system: &str,
    message: &str,
) -> Result<Option<Value>, Error> {
    let text = ask(provider, system, message).await?;
    match extract_json(&text) {
        Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(value)),
        None => Err(Error::Tool(format!(
            "could not interpret LLM answer as JSON: {text}"
        ))),
    }
}

/// Pull a JSON value out of an LLM answer, tolerating markdown fences
/// and surrounding prose.
pub fn extract_json(text: &str) -> Option<Value> {
    let stripped = strip_fences(text);
    let trimmed = stripped.trim();

    if trimmed.eq_ignore_ascii_case("none") || trimmed.eq_ignore_ascii_case("null") {
        return Some(Value::Null);
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    // Models sometimes wrap the object in prose. Take the outermost braces.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```python"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
