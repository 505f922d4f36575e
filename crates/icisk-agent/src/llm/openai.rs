use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::Error;
use crate::llm::LlmProvider;
use crate::llm::types::{
    CompletionRequest, CompletionResponse, ContentBlock, Role, StopReason, TokenUsage, ToolChoice,
    ToolDefinition,
};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat-completions provider.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: API_URL.into(),
        }
    }

    /// Point at an OpenAI-compatible endpoint (proxies, local gateways).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let body = build_request(&self.model, &request);

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Sanitize body for auth failures to avoid leaking API key fragments in logs
            let message = if status.as_u16() == 401 || status.as_u16() == 403 {
                format!("authentication failed (HTTP {})", status.as_u16())
            } else {
                response
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("<body read error: {e}>"))
            };
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ApiResponse = response.json().await?;
        into_completion_response(api_response)
    }
}

// --- Request building: our types → OpenAI format ---

fn build_request(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let mut messages = Vec::new();

    if !request.system.is_empty() {
        messages.push(serde_json::json!({
            "role": "system",
            "content": request.system,
        }));
    }

    for msg in &request.messages {
        match msg.role {
            Role::User => {
                // Collect text blocks into a single message to avoid consecutive user messages
                let mut text_parts = Vec::new();
                for block in &msg.content {
                    match block {
                        ContentBlock::Text { text } => {
                            text_parts.push(text.as_str());
                        }
                        ContentBlock::ToolResult {
                            tool_use_id,
                            name,
                            content,
                            is_error,
                        } => {
                            // OpenAI format has no is_error field; prefix content
                            // so the LLM sees the error context.
                            let content = if *is_error {
                                format!("[ERROR] {content}")
                            } else {
                                content.clone()
                            };
                            messages.push(serde_json::json!({
                                "role": "tool",
                                "tool_call_id": tool_use_id,
                                "name": name,
                                "content": content,
                            }));
                        }
                        ContentBlock::ToolUse { .. } => {}
                    }
                }
                if !text_parts.is_empty() {
                    messages.push(serde_json::json!({
                        "role": "user",
                        "content": text_parts.join("\n\n"),
                    }));
                }
            }
            Role::System => {
                messages.push(serde_json::json!({
                    "role": "system",
                    "content": msg.text(),
                }));
            }
            Role::Assistant => {
                let text = msg.text();

                let tool_calls: Vec<serde_json::Value> = msg
                    .content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolUse { id, name, input } => Some(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            }
                        })),
                        _ => None,
                    })
                    .collect();

                let mut msg_json = serde_json::json!({ "role": "assistant" });
                msg_json["content"] = if text.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::Value::String(text)
                };
                if !tool_calls.is_empty() {
                    msg_json["tool_calls"] = serde_json::Value::Array(tool_calls);
                }
                messages.push(msg_json);
            }
        }
    }

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
    });

    if !request.tools.is_empty() {
        let tools: Vec<serde_json::Value> = request.tools.iter().map(tool_to_openai).collect();
        body["tools"] = serde_json::Value::Array(tools);
    }

    if let Some(choice) = &request.tool_choice {
        body["tool_choice"] = match choice {
            ToolChoice::Auto => serde_json::json!("auto"),
            ToolChoice::Any => serde_json::json!("required"),
            ToolChoice::Tool { name } => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        };
    }

    body
}

fn tool_to_openai(tool: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

// --- Response parsing: OpenAI format → our types ---

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

fn into_completion_response(api: ApiResponse) -> Result<CompletionResponse, Error> {
    let choice = api.choices.into_iter().next().ok_or_else(|| Error::Api {
        status: 0,
        message: "empty choices array in response".into(),
    })?;

    let mut content = Vec::new();

    if let Some(text) = choice.message.content {
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
    }

    if let Some(tool_calls) = choice.message.tool_calls {
        for tc in tool_calls {
            let input: serde_json::Value = if tc.function.arguments.is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
                    warn!(
                        tool = %tc.function.name,
                        error = %e,
                        "malformed tool arguments JSON, defaulting to empty object"
                    );
                    serde_json::json!({})
                })
            };
            content.push(ContentBlock::ToolUse {
                id: tc.id,
                name: tc.function.name,
                input,
            });
        }
    }

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("stop") => StopReason::EndTurn,
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        Some(other) => {
            warn!(
                finish_reason = other,
                "unknown finish_reason, treating as EndTurn"
            );
            StopReason::EndTurn
        }
        None => StopReason::EndTurn,
    };

    let usage = api.usage.map_or(TokenUsage::default(), |u| TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    Ok(CompletionResponse {
        content,
        stop_reason,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Message;
    use serde_json::json;

    fn request(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            system: String::new(),
            messages,
            tools: vec![],
            tool_choice: None,
            max_tokens: 1024,
        }
    }

    #[test]
    fn build_request_minimal() {
        let body = build_request("gpt-4o-mini", &request(vec![Message::user("hello")]));
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 1024);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "hello");
    }

    #[test]
    fn build_request_with_system_prompt_and_system_message() {
        let mut req = request(vec![
            Message::user("hi"),
            Message::system("User choose to exit the tool process"),
        ]);
        req.system = "You are helpful.".into();

        let body = build_request("m", &req);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "You are helpful.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "system");
        assert_eq!(
            messages[2]["content"],
            "User choose to exit the tool process"
        );
    }

    #[test]
    fn build_request_with_tools_and_forced_choice() {
        let mut req = request(vec![Message::user("get spi")]);
        req.tools = vec![ToolDefinition {
            name: "spi_forecast_notebook_tool".into(),
            description: "SPI forecast notebook".into(),
            input_schema: json!({"type": "object", "properties": {"area": {}}}),
        }];
        req.tool_choice = Some(ToolChoice::Tool {
            name: "spi_forecast_notebook_tool".into(),
        });

        let body = build_request("m", &req);
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "spi_forecast_notebook_tool");
        assert_eq!(body["tool_choice"]["type"], "function");
        assert_eq!(
            body["tool_choice"]["function"]["name"],
            "spi_forecast_notebook_tool"
        );
    }

    #[test]
    fn build_request_tool_choice_any_maps_to_required() {
        let mut req = request(vec![Message::user("x")]);
        req.tool_choice = Some(ToolChoice::Any);
        let body = build_request("m", &req);
        assert_eq!(body["tool_choice"], "required");
    }

    #[test]
    fn build_request_assistant_with_tool_calls() {
        let req = request(vec![
            Message::user("get historic data"),
            Message {
                role: Role::Assistant,
                content: vec![
                    ContentBlock::Text {
                        text: "Building the notebook.".into(),
                    },
                    ContentBlock::ToolUse {
                        id: "call-1".into(),
                        name: "cds_historic_notebook_tool".into(),
                        input: json!({"area": "Italy"}),
                    },
                ],
            },
        ]);

        let body = build_request("m", &req);
        let messages = body["messages"].as_array().unwrap();
        let assistant_msg = &messages[1];
        assert_eq!(assistant_msg["role"], "assistant");
        assert_eq!(assistant_msg["content"], "Building the notebook.");
        assert_eq!(assistant_msg["tool_calls"][0]["id"], "call-1");
        assert_eq!(
            assistant_msg["tool_calls"][0]["function"]["name"],
            "cds_historic_notebook_tool"
        );
    }

    #[test]
    fn build_request_tool_results_become_tool_messages() {
        let req = request(vec![Message::tool_result(
            "call-1",
            "cds_historic_notebook_tool",
            r#"{"notebook":"nb.ipynb"}"#,
        )]);

        let body = build_request("m", &req);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "tool");
        assert_eq!(messages[0]["tool_call_id"], "call-1");
        assert_eq!(messages[0]["content"], r#"{"notebook":"nb.ipynb"}"#);
    }

    #[test]
    fn parse_text_response() {
        let api = ApiResponse {
            choices: vec![ApiChoice {
                message: ApiMessage {
                    content: Some("Hello!".into()),
                    tool_calls: None,
                },
                finish_reason: Some("stop".into()),
            }],
            usage: Some(ApiUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            }),
        };

        let response = into_completion_response(api).unwrap();
        assert_eq!(response.text(), "Hello!");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.usage.input_tokens, 10);
    }

    #[test]
    fn parse_tool_call_response() {
        let api = ApiResponse {
            choices: vec![ApiChoice {
                message: ApiMessage {
                    content: None,
                    tool_calls: Some(vec![ApiToolCall {
                        id: "call_abc".into(),
                        function: ApiFunction {
                            name: "code_editor_tool".into(),
                            arguments: r#"{"source":"nb.ipynb"}"#.into(),
                        },
                    }]),
                },
                finish_reason: Some("tool_calls".into()),
            }],
            usage: None,
        };

        let response = into_completion_response(api).unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        let calls = response.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].input["source"], "nb.ipynb");
    }

    #[test]
    fn parse_malformed_arguments_default_to_empty_object() {
        let api = ApiResponse {
            choices: vec![ApiChoice {
                message: ApiMessage {
                    content: None,
                    tool_calls: Some(vec![ApiToolCall {
                        id: "c1".into(),
                        function: ApiFunction {
                            name: "t".into(),
                            arguments: "{not json".into(),
                        },
                    }]),
                },
                finish_reason: Some("tool_calls".into()),
            }],
            usage: None,
        };
        let response = into_completion_response(api).unwrap();
        assert_eq!(response.tool_calls()[0].input, json!({}));
    }

    #[test]
    fn parse_empty_choices_errors() {
        let api = ApiResponse {
            choices: vec![],
            usage: None,
        };
        let err = into_completion_response(api).unwrap_err();
        assert!(err.to_string().contains("empty choices"));
    }
}
