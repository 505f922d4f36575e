//! Tool abstractions and the guarded execution lifecycle.
//!
//! A tool run walks a fixed pipeline: required-argument check,
//! validation rules, argument inference, argument confirmation,
//! execution, output confirmation. Any stage can pause the run with a
//! [`ToolInterrupt`] that the interrupt node turns into a conversation
//! with the user.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Error;
use crate::graph::{GraphContext, GraphState};
use crate::llm::types::ToolDefinition;

/// Why a tool run paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterruptKind {
    /// Required arguments are missing.
    ProvideArgs,
    /// Provided arguments failed validation.
    InvalidArgs,
    /// Arguments are complete; the user must approve execution.
    ConfirmArgs,
    /// Execution produced an output the user must approve.
    ConfirmOutput,
}

/// A paused tool run, with everything the interrupt node needs to
/// resume the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInterrupt {
    pub tool: String,
    #[serde(rename = "type")]
    pub kind: InterruptKind,
    pub reason: String,
    pub data: Value,
}

/// Per-invocation tool state, carried in the graph's node params
/// between the handler and interrupt nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSession {
    /// Whether the user has approved the arguments for execution.
    pub execution_confirmed: bool,
    /// Whether the user has approved the execution output.
    pub output_confirmed: bool,
    /// Output held back while waiting for output confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl Default for ToolSession {
    fn default() -> Self {
        Self {
            execution_confirmed: false,
            output_confirmed: true,
            output: None,
        }
    }
}

/// Outcome of driving a tool through its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRun {
    Completed(Value),
    Interrupted(ToolInterrupt),
}

/// A tool the agent can run on the user's behalf.
pub trait AgentTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Session a fresh invocation starts with. The default requires
    /// argument confirmation and skips output confirmation.
    fn initial_session(&self) -> ToolSession {
        ToolSession::default()
    }

    /// Per-argument validation. Returns `(argument, reason)` pairs for
    /// every provided argument that is unacceptable.
    fn validate<'a>(
        &'a self,
        _args: &'a Map<String, Value>,
        _state: &'a GraphState,
        _ctx: &'a GraphContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<(String, String)>, Error>> + Send + 'a>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    /// Fill in derived arguments (defaults, geocoding, rounding).
    /// May flip `session.execution_confirmed` off when an inference is
    /// uncertain enough to need a fresh look from the user.
    fn infer<'a>(
        &'a self,
        args: Map<String, Value>,
        _ctx: &'a GraphContext,
        _session: &'a mut ToolSession,
    ) -> Pin<Box<dyn Future<Output = Result<Map<String, Value>, Error>> + Send + 'a>> {
        Box::pin(async move { Ok(args) })
    }

    fn execute<'a>(
        &'a self,
        args: &'a Map<String, Value>,
        state: &'a GraphState,
        ctx: &'a GraphContext,
        session: &'a mut ToolSession,
    ) -> Pin<Box<dyn Future<Output = Result<Value, Error>> + Send + 'a>>;
}

/// Required argument names from a tool's JSON schema.
fn required_args(definition: &ToolDefinition) -> Vec<String> {
    definition.input_schema["required"]
        .as_array()
        .map(|names| {
            names
                .iter()
                .filter_map(|n| n.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn args_schema(definition: &ToolDefinition) -> Value {
    definition.input_schema["properties"].clone()
}

/// Type-level violations of the tool's JSON schema, keyed by the
/// offending argument.
fn schema_violations(definition: &ToolDefinition, args: &Map<String, Value>) -> Vec<(String, String)> {
    let validator = match jsonschema::validator_for(&definition.input_schema) {
        Ok(validator) => validator,
        Err(_) => return Vec::new(),
    };
    let instance = Value::Object(args.clone());
    validator
        .iter_errors(&instance)
        .map(|error| {
            let path = error.instance_path.to_string();
            let arg = path
                .trim_start_matches('/')
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string();
            (arg, error.to_string())
        })
        .collect()
}

/// Drive a tool through its lifecycle until it completes or pauses.
///
/// `args` are mutated in place by inference so the caller can write
/// them back into the pending tool-call message.
pub async fn run_tool(
    tool: &dyn AgentTool,
    args: &mut Map<String, Value>,
    state: &GraphState,
    ctx: &GraphContext,
    session: &mut ToolSession,
) -> Result<ToolRun, Error> {
    let definition = tool.definition();
    let name = definition.name.clone();

    // A held output means the arguments already passed the full check
    // in the run that produced it; the resumed run goes straight to
    // execution to commit the reviewed output.
    if session.output.is_none() {
        // Absent and explicit null both count as missing.
        let missing: Vec<String> = required_args(&definition)
            .into_iter()
            .filter(|arg| matches!(args.get(arg.as_str()), None | Some(Value::Null)))
            .collect();
        if !missing.is_empty() {
            debug!(tool = %name, missing = ?missing, "tool paused: missing required arguments");
            session.execution_confirmed = false;
            return Ok(ToolRun::Interrupted(ToolInterrupt {
                tool: name,
                kind: InterruptKind::ProvideArgs,
                reason: format!("Missing required arguments: {}", missing.join(", ")),
                data: serde_json::json!({
                    "missing_args": missing,
                    "args_schema": args_schema(&definition),
                }),
            }));
        }

        let mut invalid = schema_violations(&definition, args);
        invalid.extend(tool.validate(args, state, ctx).await?);
        if !invalid.is_empty() {
            debug!(tool = %name, invalid = ?invalid, "tool paused: invalid arguments");
            session.execution_confirmed = false;
            let invalid_map: Map<String, Value> = invalid
                .into_iter()
                .map(|(arg, reason)| (arg, Value::String(reason)))
                .collect();
            return Ok(ToolRun::Interrupted(ToolInterrupt {
                tool: name,
                kind: InterruptKind::InvalidArgs,
                reason: "Some arguments are invalid".to_string(),
                data: serde_json::json!({
                    "invalid_args": invalid_map,
                    "args_schema": args_schema(&definition),
                }),
            }));
        }

        *args = tool.infer(std::mem::take(args), ctx, session).await?;

        if !session.execution_confirmed {
            debug!(tool = %name, "tool paused: awaiting argument confirmation");
            return Ok(ToolRun::Interrupted(ToolInterrupt {
                tool: name,
                kind: InterruptKind::ConfirmArgs,
                reason: "The tool is ready to run with these arguments".to_string(),
                data: serde_json::json!({
                    "args": args,
                    "args_schema": args_schema(&definition),
                }),
            }));
        }
    }

    let output = tool.execute(args, state, ctx, session).await?;

    if !session.output_confirmed {
        debug!(tool = %name, "tool paused: awaiting output confirmation");
        session.output = Some(output.clone());
        return Ok(ToolRun::Interrupted(ToolInterrupt {
            tool: name,
            kind: InterruptKind::ConfirmOutput,
            reason: "The tool produced an output that needs review".to_string(),
            data: serde_json::json!({
                "args": args,
                "output": output,
            }),
        }));
    }

    Ok(ToolRun::Completed(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphContext, InterruptPrompt};
    use crate::llm::types::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
    use crate::llm::LlmProvider;
    use crate::store::InMemoryNotebookStore;
    use serde_json::json;
    use std::sync::Arc;

    struct SilentProvider;

    impl LlmProvider for SilentProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, Error> {
            Ok(CompletionResponse {
                content: vec![],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            })
        }
    }

    fn test_ctx() -> GraphContext {
        GraphContext::new(
            Arc::new(SilentProvider),
            Arc::new(InMemoryNotebookStore::new()),
            Arc::new(|_prompt: InterruptPrompt| {
                Box::pin(async move { Ok("ok".to_string()) })
            }),
        )
    }

    struct EchoTool;

    impl AgentTool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".into(),
                description: "Echoes its arguments".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "text": {"type": "string"},
                        "times": {"type": "integer"},
                    },
                    "required": ["text"],
                }),
            }
        }

        fn validate<'a>(
            &'a self,
            args: &'a Map<String, Value>,
            _state: &'a GraphState,
            _ctx: &'a GraphContext,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<(String, String)>, Error>> + Send + 'a>>
        {
            Box::pin(async move {
                let mut invalid = Vec::new();
                if let Some(times) = args.get("times").and_then(Value::as_i64) {
                    if times < 1 {
                        invalid.push(("times".to_string(), "must be at least 1".to_string()));
                    }
                }
                Ok(invalid)
            })
        }

        fn execute<'a>(
            &'a self,
            args: &'a Map<String, Value>,
            _state: &'a GraphState,
            _ctx: &'a GraphContext,
            _session: &'a mut ToolSession,
        ) -> Pin<Box<dyn Future<Output = Result<Value, Error>> + Send + 'a>> {
            Box::pin(async move { Ok(json!({"echoed": args.get("text")})) })
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn missing_required_arg_pauses_with_provide_args() {
        let ctx = test_ctx();
        let state = GraphState::default();
        let mut session = ToolSession::default();
        let mut a = args(json!({}));

        let run = run_tool(&EchoTool, &mut a, &state, &ctx, &mut session)
            .await
            .unwrap();
        match run {
            ToolRun::Interrupted(interrupt) => {
                assert_eq!(interrupt.kind, InterruptKind::ProvideArgs);
                assert_eq!(interrupt.data["missing_args"], json!(["text"]));
            }
            other => panic!("expected interrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn explicit_null_counts_as_missing() {
        let ctx = test_ctx();
        let state = GraphState::default();
        let mut session = ToolSession::default();
        let mut a = args(json!({"text": null}));

        let run = run_tool(&EchoTool, &mut a, &state, &ctx, &mut session)
            .await
            .unwrap();
        assert!(matches!(
            run,
            ToolRun::Interrupted(ToolInterrupt {
                kind: InterruptKind::ProvideArgs,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn invalid_arg_pauses_with_reason() {
        let ctx = test_ctx();
        let state = GraphState::default();
        let mut session = ToolSession::default();
        let mut a = args(json!({"text": "hi", "times": 0}));

        let run = run_tool(&EchoTool, &mut a, &state, &ctx, &mut session)
            .await
            .unwrap();
        match run {
            ToolRun::Interrupted(interrupt) => {
                assert_eq!(interrupt.kind, InterruptKind::InvalidArgs);
                assert_eq!(interrupt.data["invalid_args"]["times"], "must be at least 1");
            }
            other => panic!("expected interrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn schema_type_violation_pauses_with_invalid_args() {
        let ctx = test_ctx();
        let state = GraphState::default();
        let mut session = ToolSession::default();
        let mut a = args(json!({"text": "hi", "times": "three"}));

        let run = run_tool(&EchoTool, &mut a, &state, &ctx, &mut session)
            .await
            .unwrap();
        match run {
            ToolRun::Interrupted(interrupt) => {
                assert_eq!(interrupt.kind, InterruptKind::InvalidArgs);
                assert!(interrupt.data["invalid_args"]
                    .as_object()
                    .unwrap()
                    .contains_key("times"));
            }
            other => panic!("expected interrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unconfirmed_args_pause_before_execution() {
        let ctx = test_ctx();
        let state = GraphState::default();
        let mut session = ToolSession::default();
        let mut a = args(json!({"text": "hi"}));

        let run = run_tool(&EchoTool, &mut a, &state, &ctx, &mut session)
            .await
            .unwrap();
        match run {
            ToolRun::Interrupted(interrupt) => {
                assert_eq!(interrupt.kind, InterruptKind::ConfirmArgs);
                assert_eq!(interrupt.data["args"]["text"], "hi");
            }
            other => panic!("expected interrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn confirmed_args_run_to_completion() {
        let ctx = test_ctx();
        let state = GraphState::default();
        let mut session = ToolSession {
            execution_confirmed: true,
            ..Default::default()
        };
        let mut a = args(json!({"text": "hi"}));

        let run = run_tool(&EchoTool, &mut a, &state, &ctx, &mut session)
            .await
            .unwrap();
        assert_eq!(run, ToolRun::Completed(json!({"echoed": "hi"})));
    }

    #[tokio::test]
    async fn unconfirmed_output_pauses_after_execution() {
        let ctx = test_ctx();
        let state = GraphState::default();
        let mut session = ToolSession {
            execution_confirmed: true,
            output_confirmed: false,
            output: None,
        };
        let mut a = args(json!({"text": "hi"}));

        let run = run_tool(&EchoTool, &mut a, &state, &ctx, &mut session)
            .await
            .unwrap();
        match run {
            ToolRun::Interrupted(interrupt) => {
                assert_eq!(interrupt.kind, InterruptKind::ConfirmOutput);
                assert_eq!(interrupt.data["output"]["echoed"], "hi");
                assert_eq!(session.output, Some(json!({"echoed": "hi"})));
            }
            other => panic!("expected interrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn held_output_skips_argument_recheck() {
        let ctx = test_ctx();
        let state = GraphState::default();
        // The run that produced the held output already validated and
        // confirmed the arguments; the commit must not re-check them.
        let mut session = ToolSession {
            execution_confirmed: true,
            output_confirmed: true,
            output: Some(json!({"echoed": "hi"})),
        };
        let mut a = args(json!({"text": "hi", "times": 0}));

        let run = run_tool(&EchoTool, &mut a, &state, &ctx, &mut session)
            .await
            .unwrap();
        assert_eq!(run, ToolRun::Completed(json!({"echoed": "hi"})));
    }

    #[test]
    fn interrupt_kind_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&InterruptKind::ProvideArgs).unwrap(),
            "\"PROVIDE_ARGS\""
        );
        assert_eq!(
            serde_json::to_string(&InterruptKind::ConfirmOutput).unwrap(),
            "\"CONFIRM_OUTPUT\""
        );
    }

    #[test]
    fn tool_interrupt_serializes_kind_as_type() {
        let interrupt = ToolInterrupt {
            tool: "echo".into(),
            kind: InterruptKind::ConfirmArgs,
            reason: "ready".into(),
            data: json!({}),
        };
        let value = serde_json::to_value(&interrupt).unwrap();
        assert_eq!(value["type"], "CONFIRM_ARGS");
        assert_eq!(value["tool"], "echo");
    }
}
