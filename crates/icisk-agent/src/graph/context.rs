use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::llm::BoxedProvider;
use crate::store::NotebookStore;
use crate::tool::InterruptKind;

/// A question surfaced to the user while a tool is paused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptPrompt {
    /// Node that raised the interrupt.
    pub node: String,
    pub kind: InterruptKind,
    /// User-facing text, already phrased by the LLM.
    pub content: String,
}

/// Callback that delivers an [`InterruptPrompt`] to the user and
/// resolves with their free-form answer.
pub type Interaction =
    dyn Fn(InterruptPrompt) -> Pin<Box<dyn Future<Output = Result<String, Error>> + Send>>
        + Send
        + Sync;

/// Shared services available to every graph node.
#[derive(Clone)]
pub struct GraphContext {
    pub provider: BoxedProvider,
    pub store: Arc<dyn NotebookStore>,
    pub interaction: Arc<Interaction>,
    pub max_tokens: u32,
}

impl GraphContext {
    pub fn new(
        provider: BoxedProvider,
        store: Arc<dyn NotebookStore>,
        interaction: Arc<Interaction>,
    ) -> Self {
        Self {
            provider,
            store,
            interaction,
            max_tokens: 2048,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Ask the user a question and wait for their answer.
    pub async fn interact(&self, prompt: InterruptPrompt) -> Result<String, Error> {
        (self.interaction)(prompt).await
    }
}
