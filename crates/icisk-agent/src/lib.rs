//! Graph-orchestrated, human-in-the-loop LLM agent that builds Jupyter
//! notebooks for I-Cisk climate data workflows.
//!
//! The agent is a small state-machine graph: a chatbot node talks to
//! the user and routes tool calls to per-tool subgraphs, where a
//! handler node drives the tool through a guarded lifecycle and an
//! interrupt node turns every pause (missing arguments, validation
//! failures, confirmations) into a conversation with the user.

pub mod agent;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod names;
pub mod nodes;
pub mod notebook;
pub mod store;
pub mod tool;
pub mod tools;

pub use agent::{build_graph, Agent};
pub use config::AgentConfig;
pub use error::Error;
pub use graph::{GraphContext, GraphState, Interaction, InterruptPrompt};
pub use llm::openai::OpenAiProvider;
pub use llm::retry::{RetryConfig, RetryingProvider};
pub use llm::{BoxedProvider, DynLlmProvider, LlmProvider};
pub use store::{InMemoryNotebookStore, NotebookRecord, NotebookStore};
pub use tool::{AgentTool, InterruptKind, ToolInterrupt, ToolSession};
