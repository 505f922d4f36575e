//! Handler nodes drive a tool through its lifecycle and park the run
//! on the interrupt node whenever the tool needs the user.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Error;
use crate::graph::{ChatMessage, Command, GraphContext, GraphState, Node, StateUpdate};
use crate::llm::types::{ContentBlock, Message, ToolCall};
use crate::tool::{run_tool, AgentTool, ToolInterrupt, ToolRun, ToolSession};

/// Everything a paused tool run needs to resume, stored in the graph's
/// node params under the interrupt node's name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptState {
    /// Id of the assistant message carrying the pending tool call.
    pub tool_message_id: String,
    pub tool_call: ToolCall,
    pub tool_interrupt: ToolInterrupt,
    pub tool_session: ToolSession,
    /// Handler node to return to after the user answered.
    pub tool_handler_node: String,
}

/// Replace the input of the tool call `id` within `message`.
pub(crate) fn with_tool_input(message: &Message, id: &str, input: Value) -> Message {
    let content = message
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::ToolUse {
                id: call_id, name, ..
            } if call_id == id => ContentBlock::ToolUse {
                id: call_id.clone(),
                name: name.clone(),
                input: input.clone(),
            },
            other => other.clone(),
        })
        .collect();
    Message {
        role: message.role,
        content,
    }
}

/// Runs the pending tool call of its subgraph.
pub struct ToolHandlerNode {
    name: String,
    interrupt_node: String,
    tools: Vec<Arc<dyn AgentTool>>,
}

impl ToolHandlerNode {
    pub fn new(
        name: impl Into<String>,
        interrupt_node: impl Into<String>,
        tools: Vec<Arc<dyn AgentTool>>,
    ) -> Self {
        Self {
            name: name.into(),
            interrupt_node: interrupt_node.into(),
            tools,
        }
    }

    /// The most recent message carrying a call to one of this
    /// handler's tools.
    fn pending_call<'a>(&self, state: &'a GraphState) -> Option<(&'a ChatMessage, ToolCall)> {
        state.messages.iter().rev().find_map(|chat_message| {
            chat_message
                .message
                .first_tool_call()
                .filter(|call| self.tools.iter().any(|t| t.definition().name == call.name))
                .map(|call| (chat_message, call))
        })
    }
}

impl Node for ToolHandlerNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        state: &'a GraphState,
        ctx: &'a GraphContext,
    ) -> Pin<Box<dyn Future<Output = Result<Command, Error>> + Send + 'a>> {
        Box::pin(async move {
            let (chat_message, call) = self.pending_call(state).ok_or_else(|| {
                Error::Graph(format!("node '{}' found no pending tool call", self.name))
            })?;
            let tool = self
                .tools
                .iter()
                .find(|t| t.definition().name == call.name)
                .ok_or_else(|| Error::Graph(format!("unknown tool '{}'", call.name)))?;

            // A resumed run carries its session in the interrupt
            // node's params; a fresh one starts from the tool default.
            let mut session = state
                .node_params
                .get(&self.interrupt_node)
                .and_then(|value| {
                    serde_json::from_value::<InterruptState>(value.clone())
                        .ok()
                        .map(|interrupt_state| interrupt_state.tool_session)
                })
                .unwrap_or_else(|| tool.initial_session());

            let mut args = call.input.as_object().cloned().unwrap_or_default();
            let run = run_tool(tool.as_ref(), &mut args, state, ctx, &mut session).await?;

            // Inference may have filled in arguments; write them back
            // into the pending tool-call message.
            let updated_message = ChatMessage::with_id(
                chat_message.id.clone(),
                with_tool_input(&chat_message.message, &call.id, Value::Object(args.clone())),
            );

            match run {
                ToolRun::Completed(output) => {
                    debug!(tool = %call.name, "tool completed");
                    let result = ChatMessage::new(Message::tool_result(
                        call.id.clone(),
                        call.name.clone(),
                        output.to_string(),
                    ));
                    let update = StateUpdate::default()
                        .push_message(updated_message)
                        .push_message(result)
                        .visit(self.name())
                        .clear_node_params();
                    Ok(Command::end().with_update(update))
                }
                ToolRun::Interrupted(interrupt) => {
                    debug!(tool = %call.name, kind = ?interrupt.kind, "tool interrupted");
                    let interrupt_state = InterruptState {
                        tool_message_id: chat_message.id.clone(),
                        tool_call: ToolCall {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: Value::Object(args),
                        },
                        tool_interrupt: interrupt,
                        tool_session: session,
                        tool_handler_node: self.name.clone(),
                    };
                    let mut params = state.node_params.clone();
                    params.insert(
                        self.interrupt_node.clone(),
                        serde_json::to_value(&interrupt_state)?,
                    );
                    let update = StateUpdate::default()
                        .push_message(updated_message)
                        .visit(self.name())
                        .set_node_params(params);
                    Ok(Command::goto(self.interrupt_node.clone()).with_update(update))
                }
            }
        })
    }
}
