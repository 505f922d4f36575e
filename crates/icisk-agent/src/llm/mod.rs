pub mod oneshot;
pub mod openai;
pub mod retry;
pub mod types;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::llm::types::{CompletionRequest, CompletionResponse};

/// Trait for LLM providers.
///
/// Implementors must be thread-safe (`Send + Sync`) to allow
/// shared usage across concurrent graph nodes.
pub trait LlmProvider: Send + Sync {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, Error>> + Send;
}

/// Dyn-compatible variant of [`LlmProvider`], for storing providers
/// behind `Arc<dyn DynLlmProvider>` in the graph context.
pub trait DynLlmProvider: Send + Sync {
    fn complete_dyn<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, Error>> + Send + 'a>>;
}

impl<P: LlmProvider> DynLlmProvider for P {
    fn complete_dyn<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, Error>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }
}

pub type BoxedProvider = Arc<dyn DynLlmProvider>;
