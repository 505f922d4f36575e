//! End-to-end runs of the orchestration graph with a scripted provider.

use std::sync::{Arc, Mutex};

use icisk_agent::graph::InterruptPrompt;
use icisk_agent::llm::types::{
    CompletionRequest, CompletionResponse, ContentBlock, Role, StopReason, TokenUsage,
};
use icisk_agent::llm::LlmProvider;
use icisk_agent::{
    names, Agent, Error, GraphContext, InMemoryNotebookStore, Interaction, NotebookStore,
};
use serde_json::json;

/// Returns the scripted responses in order, one per completion call.
struct ScriptedProvider {
    responses: Mutex<Vec<CompletionResponse>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }
}

impl LlmProvider for ScriptedProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let mut responses = self.responses.lock().unwrap();
        assert!(!responses.is_empty(), "provider called more times than scripted");
        Ok(responses.remove(0))
    }
}

fn text(content: &str) -> CompletionResponse {
    CompletionResponse {
        content: vec![ContentBlock::Text {
            text: content.into(),
        }],
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage::default(),
    }
}

fn tool_call(name: &str, input: serde_json::Value) -> CompletionResponse {
    CompletionResponse {
        content: vec![ContentBlock::ToolUse {
            id: "call-1".into(),
            name: name.into(),
            input,
        }],
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::default(),
    }
}

fn interaction(answer: &str) -> Arc<Interaction> {
    let answer = answer.to_string();
    Arc::new(move |_prompt: InterruptPrompt| {
        let answer = answer.clone();
        Box::pin(async move { Ok(answer) })
    })
}

#[tokio::test]
async fn spi_request_runs_through_confirmation_to_a_stored_notebook() {
    let provider = ScriptedProvider::new(vec![
        // Chatbot picks the SPI tool.
        tool_call(
            names::SPI_FORECAST_NOTEBOOK_TOOL,
            json!({"area": [7.0, 44.0, 9.0, 46.0]}),
        ),
        // Interrupt node phrases the confirmation question.
        text("These are the arguments, shall I proceed?"),
        // Interrupt node interprets the user's "yes".
        text("true"),
        // Chatbot closes the conversation after the tool result.
        text("Your SPI notebook is ready."),
    ]);
    let store = Arc::new(InMemoryNotebookStore::new());
    let ctx = GraphContext::new(Arc::new(provider), store.clone(), interaction("yes, go ahead"));

    let mut agent = Agent::new(ctx, "alice").unwrap();
    let reply = agent.chat("Compute the SPI forecast for Piedmont").await.unwrap();

    assert_eq!(reply, "Your SPI notebook is ready.");

    // The notebook was rendered and saved under the default name.
    let notebooks = store.list("alice").await.unwrap();
    assert_eq!(notebooks.len(), 1);
    assert!(notebooks[0].starts_with("icisk-ai_spi-forecast_"));
    let record = store.get("alice", &notebooks[0]).await.unwrap().unwrap();
    assert!(!record.source.cells.is_empty());

    // The run went chatbot -> subgraph (handler, interrupt, handler) -> chatbot.
    let history = &agent.state().node_history;
    assert_eq!(history[0], names::CHATBOT);
    assert!(history.contains(&names::SPI_CALCULATION_TOOL_HANDLER.to_string()));
    assert!(history.contains(&names::SPI_CALCULATION_TOOL_INTERRUPT.to_string()));
    assert_eq!(history.last().unwrap(), names::CHATBOT);

    // The tool result landed in the conversation.
    assert!(agent.state().messages.iter().any(|m| {
        matches!(
            m.message.content.first(),
            Some(ContentBlock::ToolResult { name, .. })
                if name == names::SPI_FORECAST_NOTEBOOK_TOOL
        )
    }));

    // Node params are cleared once the tool completes.
    assert!(agent.state().node_params.is_empty());
}

#[tokio::test]
async fn aborting_a_tool_removes_the_call_and_notes_the_exit() {
    let provider = ScriptedProvider::new(vec![
        // Chatbot calls the historic ingestor with nothing filled in.
        tool_call(names::CDS_HISTORIC_NOTEBOOK_TOOL, json!({})),
        // Interrupt node asks for the missing arguments.
        text("I need a dataset, variables and an area to proceed."),
        // Interrupt node interprets the user's answer as an abort.
        text("None"),
        // Chatbot acknowledges after the queued updates are applied.
        text("Alright, I stopped the data retrieval."),
    ]);
    let store = Arc::new(InMemoryNotebookStore::new());
    let ctx = GraphContext::new(Arc::new(provider), store.clone(), interaction("forget it"));

    let mut agent = Agent::new(ctx, "alice").unwrap();
    let reply = agent.chat("Get me some historic data").await.unwrap();

    assert_eq!(reply, "Alright, I stopped the data retrieval.");

    // The pending tool call is gone, replaced by an exit note.
    assert!(agent
        .state()
        .messages
        .iter()
        .all(|m| m.message.first_tool_call().is_none()));
    assert!(agent.state().messages.iter().any(|m| {
        m.message.role == Role::System
            && m.message.text().contains("exit the tool process")
    }));

    // Nothing was saved.
    assert!(store.list("alice").await.unwrap().is_empty());

    // The queued message updates were consumed.
    assert!(!agent
        .state()
        .node_params
        .contains_key(names::CHATBOT_UPDATE_MESSAGES));
}
