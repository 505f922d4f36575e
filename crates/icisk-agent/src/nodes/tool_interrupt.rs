//! Interrupt nodes turn a paused tool run into a conversation: phrase
//! the question, collect the user's answer, interpret it, and either
//! resume the handler or abort the whole tool process.

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Error;
use crate::graph::{
    ChatMessage, Command, GraphContext, GraphState, Goto, InterruptPrompt, MessageOp, Node,
    StateUpdate,
};
use crate::llm::oneshot;
use crate::llm::types::Message;
use crate::names;
use crate::nodes::tool_handler::{with_tool_input, InterruptState};
use crate::tool::InterruptKind;

const PHRASING_SYSTEM_PROMPT: &str = "You are an assistant that mediates the execution of data-analysis tools. \
    Write a short and clear message for the user. Do not mention tools by their internal names.";

const EVAL_SYSTEM_PROMPT: &str = "You interpret user answers for a tool execution pipeline. \
    Respond only with the requested value, without any explanation or markdown formatting.";

/// Instructions used to interpret the user's review of a tool output.
pub const DEFAULT_OUTPUT_REVIEW: &str = "If the user asks for changes, update the input arguments with the information \
    the user provided and return the updated JSON object of input arguments and nothing else.";

/// Code-generation variant: change requests refine the request text
/// instead of touching the other arguments.
pub const CODE_OUTPUT_REVIEW: &str = "If the user asks for changes, update the initial input argument 'code_request' \
    with the user provided information in order to get a more detailed request. \
    Return the updated JSON object of input arguments and nothing else.";

/// What the user's answer means for the paused run.
enum Resolution {
    Confirmed,
    UpdatedArgs(Map<String, Value>),
    Abort,
}

/// Pauses the subgraph on a [`crate::tool::ToolInterrupt`] and talks
/// the user through it.
pub struct ToolInterruptNode {
    name: String,
    output_review: &'static str,
}

impl ToolInterruptNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output_review: DEFAULT_OUTPUT_REVIEW,
        }
    }

    /// Override how output change requests are folded back into the
    /// tool arguments.
    pub fn with_output_review(mut self, instructions: &'static str) -> Self {
        self.output_review = instructions;
        self
    }

    /// Phrase the question shown to the user.
    async fn phrase_prompt(
        &self,
        interrupt_state: &InterruptState,
        ctx: &GraphContext,
    ) -> Result<String, Error> {
        let interrupt = &interrupt_state.tool_interrupt;
        let data = &interrupt.data;
        let message = match interrupt.kind {
            InterruptKind::ProvideArgs => format!(
                "A tool cannot run yet because some required arguments are missing.\n\
                 Missing arguments: {}\n\
                 Arguments schema: {}\n\
                 Ask the user to provide the missing arguments, briefly describing each one.",
                data["missing_args"], data["args_schema"],
            ),
            InterruptKind::InvalidArgs => format!(
                "A tool cannot run because some arguments are invalid.\n\
                 Invalid arguments with reasons: {}\n\
                 Arguments schema: {}\n\
                 Report the problems to the user and ask for corrected values.",
                data["invalid_args"], data["args_schema"],
            ),
            InterruptKind::ConfirmArgs => format!(
                "A tool is ready to run with these arguments: {}\n\
                 Present the arguments to the user and ask them to confirm the execution or request changes.",
                data["args"],
            ),
            InterruptKind::ConfirmOutput => format!(
                "A tool produced this output: {}\n\
                 It ran with these arguments: {}\n\
                 Present the output to the user and ask them to confirm it or request changes.",
                data["output"], data["args"],
            ),
        };
        oneshot::ask(ctx.provider.as_ref(), PHRASING_SYSTEM_PROMPT, &message).await
    }

    /// Interpret the user's free-form answer.
    async fn interpret(
        &self,
        interrupt_state: &InterruptState,
        response: &str,
        ctx: &GraphContext,
    ) -> Result<Resolution, Error> {
        let interrupt = &interrupt_state.tool_interrupt;
        let data = &interrupt.data;
        let message = match interrupt.kind {
            InterruptKind::ProvideArgs | InterruptKind::InvalidArgs => format!(
                "A tool is waiting for these arguments: {}\n\
                 The user was asked to provide values and answered:\n{response}\n\
                 Return a JSON object mapping argument names to the values provided by the user and nothing else.\n\
                 If the user wants to stop the tool process, return None.",
                data["args_schema"],
            ),
            InterruptKind::ConfirmArgs => format!(
                "A tool is about to run with these arguments: {}\n\
                 The user was asked to confirm the execution and answered:\n{response}\n\
                 If the user confirms, return true.\n\
                 If the user asks to change some arguments, return a JSON object with only the changed arguments.\n\
                 If the user wants to stop the tool process, return None.",
                data["args"],
            ),
            InterruptKind::ConfirmOutput => format!(
                "A tool produced this output: {}\n\
                 It ran with these input arguments: {}\n\
                 The user was asked to review the output and answered:\n{response}\n\
                 If the user accepts the output, return true.\n\
                 {}\n\
                 If the user wants to stop the tool process, return None.",
                data["output"], data["args"], self.output_review,
            ),
        };

        match oneshot::ask_json(ctx.provider.as_ref(), EVAL_SYSTEM_PROMPT, &message).await? {
            None => Ok(Resolution::Abort),
            Some(Value::Bool(false)) => Ok(Resolution::Abort),
            Some(Value::Bool(true)) => Ok(Resolution::Confirmed),
            Some(Value::Object(updates)) => Ok(Resolution::UpdatedArgs(updates)),
            Some(other) => Err(Error::Interaction(format!(
                "could not interpret the user's answer: {other}"
            ))),
        }
    }

    fn abort(
        &self,
        state: &GraphState,
        interrupt_state: &InterruptState,
        response: &str,
    ) -> Result<Command, Error> {
        let ops = vec![
            MessageOp::Remove(interrupt_state.tool_message_id.clone()),
            MessageOp::Push(ChatMessage::new(Message::system(format!(
                "User choose to exit the tool process with this response: {response}"
            )))),
        ];

        // Queue the same ops for the chatbot, so they survive even
        // when the enclosing graph replays the conversation.
        let mut params = state.node_params.clone();
        params.remove(&self.name);
        params.insert(
            names::CHATBOT_UPDATE_MESSAGES.to_string(),
            serde_json::json!({ "update_messages": serde_json::to_value(&ops)? }),
        );

        let mut update = StateUpdate::default()
            .visit(self.name())
            .set_node_params(params);
        update.messages = ops;

        Ok(Command {
            update,
            goto: Goto::End,
        })
    }

    fn resume(
        &self,
        state: &GraphState,
        mut interrupt_state: InterruptState,
        resolution: Resolution,
    ) -> Result<Command, Error> {
        let kind = interrupt_state.tool_interrupt.kind;
        let mut args = interrupt_state
            .tool_call
            .input
            .as_object()
            .cloned()
            .unwrap_or_default();

        match resolution {
            Resolution::Confirmed => match kind {
                InterruptKind::ConfirmArgs => {
                    interrupt_state.tool_session.execution_confirmed = true;
                }
                InterruptKind::ConfirmOutput => {
                    interrupt_state.tool_session.output_confirmed = true;
                }
                _ => {}
            },
            Resolution::UpdatedArgs(updates) => {
                for (key, value) in updates {
                    args.insert(key, value);
                }
                if kind == InterruptKind::ConfirmOutput {
                    // Changed arguments invalidate the held output; the
                    // tool will produce a new one for review.
                    interrupt_state.tool_session.output = None;
                }
            }
            Resolution::Abort => unreachable!("abort handled by caller"),
        }
        interrupt_state.tool_call.input = Value::Object(args);

        // Write the (possibly updated) arguments back into the pending
        // tool-call message before the handler picks it up again.
        let message = state
            .messages
            .iter()
            .find(|m| m.id == interrupt_state.tool_message_id)
            .ok_or_else(|| {
                Error::Graph(format!(
                    "pending tool message '{}' not found",
                    interrupt_state.tool_message_id
                ))
            })?;
        let updated_message = ChatMessage::with_id(
            message.id.clone(),
            with_tool_input(
                &message.message,
                &interrupt_state.tool_call.id,
                interrupt_state.tool_call.input.clone(),
            ),
        );

        let handler = interrupt_state.tool_handler_node.clone();
        let mut params = state.node_params.clone();
        params.insert(self.name.clone(), serde_json::to_value(&interrupt_state)?);

        let update = StateUpdate::default()
            .push_message(updated_message)
            .visit(self.name())
            .set_node_params(params);
        Ok(Command::goto(handler).with_update(update))
    }
}

impl Node for ToolInterruptNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        state: &'a GraphState,
        ctx: &'a GraphContext,
    ) -> Pin<Box<dyn Future<Output = Result<Command, Error>> + Send + 'a>> {
        Box::pin(async move {
            let interrupt_state: InterruptState = state
                .node_params
                .get(&self.name)
                .map(|value| serde_json::from_value(value.clone()))
                .transpose()?
                .ok_or_else(|| {
                    Error::Graph(format!("node '{}' has no pending interrupt", self.name))
                })?;

            let content = self.phrase_prompt(&interrupt_state, ctx).await?;
            let response = ctx
                .interact(InterruptPrompt {
                    node: self.name.clone(),
                    kind: interrupt_state.tool_interrupt.kind,
                    content,
                })
                .await?;
            debug!(node = %self.name, "user answered an interrupt");

            match self.interpret(&interrupt_state, &response, ctx).await? {
                Resolution::Abort => self.abort(state, &interrupt_state, &response),
                resolution => self.resume(state, interrupt_state, resolution),
            }
        })
    }
}
