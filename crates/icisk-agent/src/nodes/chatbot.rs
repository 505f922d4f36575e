//! The conversational front-end of the graph.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::error::Error;
use crate::graph::{ChatMessage, Command, GraphContext, GraphState, Goto, MessageOp, Node, StateUpdate};
use crate::llm::types::{CompletionRequest, ContentBlock, Message, Role, ToolChoice};
use crate::names;
use crate::tool::AgentTool;

const SYSTEM_PROMPT: &str = "You are the I-Cisk assistant. You support users of the I-Cisk climate services platform \
    in retrieving climate data and computing climate indices.\n\
    Through your tools you can ingest historic and forecast data from the Climate Data Store (CDS), \
    calculate the forecasted Standardized Precipitation Index (SPI) and write python code in jupyter notebooks.\n\
    Use a tool only when the user's request matches its purpose, otherwise answer directly.\n\
    Never invent data or tool results.";

/// Talks to the user, decides whether a tool is needed, and routes the
/// first tool call to its subgraph.
pub struct ChatbotNode {
    tools: Vec<Arc<dyn AgentTool>>,
    /// Tool name to subgraph node name.
    routes: HashMap<String, String>,
}

impl ChatbotNode {
    pub fn new(tools: Vec<Arc<dyn AgentTool>>, routes: HashMap<String, String>) -> Self {
        Self { tools, routes }
    }
}

impl Node for ChatbotNode {
    fn name(&self) -> &str {
        names::CHATBOT
    }

    fn run<'a>(
        &'a self,
        state: &'a GraphState,
        ctx: &'a GraphContext,
    ) -> Pin<Box<dyn Future<Output = Result<Command, Error>> + Send + 'a>> {
        Box::pin(async move {
            // Message updates queued by an aborted tool run are applied
            // before the next LLM turn.
            if state.node_params.contains_key(names::CHATBOT_UPDATE_MESSAGES) {
                return Ok(Command::goto(names::CHATBOT_UPDATE_MESSAGES)
                    .with_update(StateUpdate::default().visit(self.name())));
            }

            // A one-turn tool_choice override can be queued under the
            // chatbot's own params key.
            let tool_choice = state
                .node_params
                .get(names::CHATBOT)
                .and_then(|params| params.get("tool_choice"))
                .map(|value| serde_json::from_value::<ToolChoice>(value.clone()))
                .transpose()?;

            let request = CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                messages: state.messages.iter().map(|m| m.message.clone()).collect(),
                tools: self.tools.iter().map(|t| t.definition()).collect(),
                tool_choice,
                max_tokens: ctx.max_tokens,
            };
            let response = ctx.provider.complete_dyn(request).await?;

            // Only the first tool call is routed and answered; trailing
            // calls would dangle as tool_use blocks without a matching
            // tool result, so they are dropped from the stored reply.
            let mut content: Vec<ContentBlock> = Vec::new();
            for block in &response.content {
                let is_tool_use = matches!(block, ContentBlock::ToolUse { .. });
                if is_tool_use
                    && content
                        .iter()
                        .any(|kept| matches!(kept, ContentBlock::ToolUse { .. }))
                {
                    continue;
                }
                content.push(block.clone());
            }
            let assistant = Message {
                role: Role::Assistant,
                content,
            };
            let tool_call = assistant.first_tool_call();
            let update = StateUpdate::default()
                .push_message(ChatMessage::new(assistant))
                .visit(self.name());

            match tool_call.and_then(|call| self.routes.get(&call.name)) {
                Some(subgraph) => {
                    debug!(subgraph = %subgraph, "chatbot routed a tool call");
                    Ok(Command::goto(subgraph.clone()).with_update(update))
                }
                // End of turn: any consumed override is dropped with
                // the rest of the params.
                None => Ok(Command::end().with_update(update.clear_node_params())),
            }
        })
    }
}

/// Applies the message operations queued under the
/// `chatbot_update_messages` node params key, then hands control back
/// to the chatbot through its static edge.
pub struct UpdateMessagesNode;

impl Node for UpdateMessagesNode {
    fn name(&self) -> &str {
        names::CHATBOT_UPDATE_MESSAGES
    }

    fn run<'a>(
        &'a self,
        state: &'a GraphState,
        _ctx: &'a GraphContext,
    ) -> Pin<Box<dyn Future<Output = Result<Command, Error>> + Send + 'a>> {
        Box::pin(async move {
            let ops: Vec<MessageOp> = state
                .node_params
                .get(names::CHATBOT_UPDATE_MESSAGES)
                .and_then(|params| params.get("update_messages"))
                .map(|value| serde_json::from_value(value.clone()))
                .transpose()?
                .unwrap_or_default();

            let mut params = state.node_params.clone();
            params.remove(names::CHATBOT_UPDATE_MESSAGES);

            let mut update = StateUpdate::default()
                .visit(self.name())
                .set_node_params(params);
            update.messages = ops;

            Ok(Command {
                update,
                goto: Goto::Next,
            })
        })
    }
}
