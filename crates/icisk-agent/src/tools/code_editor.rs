use std::future::Future;
use std::pin::Pin;

use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::graph::{GraphContext, GraphState};
use crate::llm::oneshot;
use crate::llm::types::ToolDefinition;
use crate::names;
use crate::notebook::Cell;
use crate::store::NotebookStore;
use crate::tool::{AgentTool, ToolSession};
use crate::tools::{self, str_arg, timestamp_slug, with_extension};

const CODER_SYSTEM_PROMPT: &str = "You are a programming assistant who helps users write python code. \
    Remember that the code is related to an analysis of geospatial data. \
    If map visualizations are requested, use the cartopy library, adding borders, coastlines, lakes and rivers.";

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```python")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
        .to_string()
}

/// Generates python code from a natural-language request and appends
/// it to one of the user's notebooks. Runs in two phases: the first
/// generates the code for review, the second commits it to the
/// notebook once the user confirms.
pub struct CodeEditorTool;

impl AgentTool for CodeEditorTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: names::CODE_EDITOR_TOOL.into(),
            description: "Useful when user want to write or edit python code in a jupyter notebook.\n\
                This tool generates python code based on the user request and appends it to a jupyter notebook.\n\
                The generated code is proposed to the user for review before being added to the notebook.\n\
                If not provided by the user, assign the specified default values to the arguments.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code_request": {
                        "type": "string",
                        "description": "The user request describing the python code to be generated.",
                    },
                    "source": {
                        "type": ["string", "null"],
                        "description": "The name of the notebook to edit. It should be the name of a notebook uploaded on database. If not specified a new notebook is created.",
                    },
                },
                "required": ["code_request"],
            }),
        }
    }

    fn initial_session(&self) -> ToolSession {
        // Code generation needs no argument review, but its output
        // must be confirmed before it lands in the notebook.
        ToolSession {
            execution_confirmed: true,
            output_confirmed: false,
            output: None,
        }
    }

    fn validate<'a>(
        &'a self,
        args: &'a Map<String, Value>,
        state: &'a GraphState,
        ctx: &'a GraphContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<(String, String)>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let mut invalid = Vec::new();

            if let Some(source) = str_arg(args, "source") {
                let author = state.user_id.clone().unwrap_or_default();
                if ctx.store.get(&author, source).await?.is_none() {
                    invalid.push((
                        "source".into(),
                        format!(
                            "Invalid source: {source}. It should be the name of a notebook uploaded on database."
                        ),
                    ));
                }
            }

            Ok(invalid)
        })
    }

    fn infer<'a>(
        &'a self,
        mut args: Map<String, Value>,
        _ctx: &'a GraphContext,
        _session: &'a mut ToolSession,
    ) -> Pin<Box<dyn Future<Output = Result<Map<String, Value>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let source = match str_arg(&args, "source") {
                Some(name) => with_extension(name, ".ipynb"),
                None => format!("icisk-ai_code_{}.ipynb", timestamp_slug()),
            };
            args.insert("source".into(), source.into());
            Ok(args)
        })
    }

    fn execute<'a>(
        &'a self,
        args: &'a Map<String, Value>,
        state: &'a GraphState,
        ctx: &'a GraphContext,
        session: &'a mut ToolSession,
    ) -> Pin<Box<dyn Future<Output = Result<Value, Error>> + Send + 'a>> {
        Box::pin(async move {
            let source = str_arg(args, "source")
                .ok_or_else(|| Error::Tool("source is not set".into()))?
                .to_string();

            if !session.output_confirmed {
                // First phase: generate the code and hand it back for
                // review.
                let code_request = str_arg(args, "code_request")
                    .ok_or_else(|| Error::Tool("code_request is not set".into()))?;

                let record = tools::load_or_create_notebook(&source, state, ctx).await?;
                let existing_code: Vec<String> = record
                    .source
                    .cells
                    .iter()
                    .filter(|cell| cell.cell_type == crate::notebook::CellType::Code)
                    .map(|cell| cell.source.clone())
                    .collect();

                // Persist right away: a freshly created notebook must
                // be visible to validation when the reviewed code comes
                // back to commit or regenerate.
                ctx.store.save(record).await?;

                let message = format!(
                    "The user requested the following code:\n{code_request}\n\n\
                     This is the code already present in the notebook, consider it as already executed context:\n\
                     {}\n\n\
                     Respond only with python code and nothing else, without any explanation or markdown formatting.",
                    existing_code.join("\n\n")
                );

                let generated = oneshot::ask(ctx.provider.as_ref(), CODER_SYSTEM_PROMPT, &message)
                    .await?;
                let code = strip_code_fences(&generated);

                return Ok(json!({
                    "notebook": source,
                    "generated_code": code,
                }));
            }

            // Second phase: the user confirmed the code, append it.
            let code = session
                .output
                .as_ref()
                .and_then(|output| output.get("generated_code"))
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Tool("no generated code to commit".into()))?
                .to_string();

            let mut record = tools::load_or_create_notebook(&source, state, ctx).await?;
            record.source.cells.push(Cell::code(&code));
            ctx.store.save(record).await?;

            Ok(json!({
                "notebook": source,
                "generated_code": code,
            }))
        })
    }
}
