use std::future::Future;
use std::pin::Pin;

use serde_json::{json, Map, Value};

use chrono::Datelike;

use crate::error::Error;
use crate::graph::{GraphContext, GraphState};
use crate::llm::types::ToolDefinition;
use crate::names;
use crate::notebook::template::{render_template, RenderValues};
use crate::notebook::templates::spi_forecast_template;
use crate::store::NotebookStore;
use crate::tool::{AgentTool, ToolSession};
use crate::tools::{
    self, first_of_month, months_after, parse_ymd, str_arg, timestamp_slug, today, with_extension,
};

const DEFAULT_REFERENCE_PERIOD: [i64; 2] = [1981, 2010];

/// Builds a notebook that computes the Standardized Precipitation
/// Index over forecasted precipitation for an area of interest.
pub struct SpiForecastNotebookTool;

impl AgentTool for SpiForecastNotebookTool {
    fn definition(&self) -> ToolDefinition {
        let default_init = first_of_month(today()).format("%Y-%m-%d");
        let default_lead = months_after(first_of_month(today()), 1).format("%Y-%m-%d");
        ToolDefinition {
            name: names::SPI_FORECAST_NOTEBOOK_TOOL.into(),
            description: "Useful when user want to calculate the forecasted Standardized Precipitation Index (SPI) for a specific area of interest.\n\
                This tool builds a jupyter notebook that retrieves precipitation data from the Climate Data Store (CDS) API and computes the SPI index over the forecast period.\n\
                This tool returns an editable jupyter notebook with the SPI calculation procedure.\n\
                If not provided by the user, assign the specified default values to the arguments.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "area": {
                        "type": ["string", "array", "null"],
                        "description": "The area of interest for the SPI calculation. If not specified use None as default.\n\
                            It could be a bounding-box defined by [min_x, min_y, max_x, max_y] coordinates provided in EPSG:4326 Coordinate Reference System.\n\
                            Otherwise it can be the name of a country, continent, or specific geographic area.",
                    },
                    "reference_period": {
                        "type": ["array", "null"],
                        "items": { "type": "integer" },
                        "description": "The reference period for the SPI calculation, as a pair of years [start_year, end_year]. If not specified use [1981, 2010] as default.",
                    },
                    "init_time": {
                        "type": ["string", "null"],
                        "description": format!("The initial datetime of the forecast provided in UTC-0 YYYY-MM-DD. If not specified use {default_init} as default."),
                    },
                    "lead_time": {
                        "type": ["string", "null"],
                        "description": format!("The lead datetime of the forecast provided in UTC-0 YYYY-MM-DD. It must be after the init_time arg. If not specified use {default_lead} as default."),
                    },
                    "jupyter_notebook": {
                        "type": ["string", "null"],
                        "description": "The path to the jupyter notebook with the SPI calculation procedure. If not specified is None.",
                    },
                },
                "required": ["area"],
            }),
        }
    }

    fn validate<'a>(
        &'a self,
        args: &'a Map<String, Value>,
        _state: &'a GraphState,
        _ctx: &'a GraphContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<(String, String)>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let mut invalid = Vec::new();

            if let Some(area) = args.get("area").and_then(Value::as_array) {
                if area.len() != 4 {
                    invalid.push((
                        "area".into(),
                        format!(
                            "Invalid area coordinates: {area:?}. It should be a list of 4 float \
                             values representing the bounding box [min_x, min_y, max_x, max_y]."
                        ),
                    ));
                }
            }

            if let Some(period) = args.get("reference_period").and_then(Value::as_array) {
                let years: Vec<i64> = period.iter().filter_map(Value::as_i64).collect();
                if years.len() != 2 || years[0] >= years[1] {
                    invalid.push((
                        "reference_period".into(),
                        format!(
                            "Invalid reference period: {period:?}. It should be a pair of years \
                             [start_year, end_year] with start_year before end_year."
                        ),
                    ));
                } else if years[1] > i64::from(today().year()) {
                    invalid.push((
                        "reference_period".into(),
                        format!(
                            "Invalid reference period: {period:?}. The end year cannot be in the future."
                        ),
                    ));
                }
            }

            let current_month = first_of_month(today());

            if let Some(init) = str_arg(args, "init_time") {
                match parse_ymd(init) {
                    None => invalid.push((
                        "init_time".into(),
                        format!("Invalid init time: {init}. It should be in the format YYYY-MM-DD."),
                    )),
                    Some(date) if date > today() => invalid.push((
                        "init_time".into(),
                        format!("Invalid init time: {init}. It should not be in the future."),
                    )),
                    Some(_) => {}
                }
            }

            if let Some(lead) = str_arg(args, "lead_time") {
                match parse_ymd(lead) {
                    None => invalid.push((
                        "lead_time".into(),
                        format!("Invalid lead time: {lead}. It should be in the format YYYY-MM-DD."),
                    )),
                    Some(date) => {
                        if let Some(init) = str_arg(args, "init_time").and_then(parse_ymd) {
                            if first_of_month(date) <= first_of_month(init) {
                                invalid.push((
                                    "lead_time".into(),
                                    format!(
                                        "Invalid lead time: {lead}. It should be at least one month after the init time."
                                    ),
                                ));
                            }
                        }
                        if first_of_month(date) > months_after(current_month, 6) {
                            invalid.push((
                                "lead_time".into(),
                                format!(
                                    "Invalid lead time: {lead}. It should be at most 6 months after the current month."
                                ),
                            ));
                        }
                    }
                }
            }

            Ok(invalid)
        })
    }

    fn infer<'a>(
        &'a self,
        mut args: Map<String, Value>,
        ctx: &'a GraphContext,
        session: &'a mut ToolSession,
    ) -> Pin<Box<dyn Future<Output = Result<Map<String, Value>, Error>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(area) = args.get("area") {
                let area = tools::infer_area(area, ctx, session).await?;
                args.insert("area".into(), area);
            }

            if args.get("reference_period").and_then(Value::as_array).is_none() {
                args.insert("reference_period".into(), json!(DEFAULT_REFERENCE_PERIOD));
            }

            let init = str_arg(&args, "init_time")
                .and_then(parse_ymd)
                .unwrap_or_else(|| first_of_month(today()));
            let lead = str_arg(&args, "lead_time")
                .and_then(parse_ymd)
                .unwrap_or_else(|| months_after(first_of_month(today()), 1));
            args.insert("init_time".into(), init.format("%Y-%m-%d").to_string().into());
            args.insert("lead_time".into(), lead.format("%Y-%m-%d").to_string().into());

            let notebook = match str_arg(&args, "jupyter_notebook") {
                Some(name) => with_extension(name, ".ipynb"),
                None => format!("icisk-ai_spi-forecast_{}.ipynb", timestamp_slug()),
            };
            args.insert("jupyter_notebook".into(), notebook.into());

            Ok(args)
        })
    }

    fn execute<'a>(
        &'a self,
        args: &'a Map<String, Value>,
        state: &'a GraphState,
        ctx: &'a GraphContext,
        _session: &'a mut ToolSession,
    ) -> Pin<Box<dyn Future<Output = Result<Value, Error>> + Send + 'a>> {
        Box::pin(async move {
            let notebook_name = str_arg(args, "jupyter_notebook")
                .ok_or_else(|| Error::Tool("jupyter_notebook is not set".into()))?
                .to_string();
            let area = args.get("area").cloned().unwrap_or(Value::Null);
            let reference_period = args
                .get("reference_period")
                .cloned()
                .unwrap_or_else(|| json!(DEFAULT_REFERENCE_PERIOD));
            let init_time = str_arg(args, "init_time").unwrap_or_default().to_string();
            let lead_time = str_arg(args, "lead_time").unwrap_or_default().to_string();

            let values: RenderValues = [
                ("area".to_string(), area),
                ("reference_period".to_string(), reference_period),
                ("init_time".to_string(), json!(init_time)),
                ("lead_time".to_string(), json!(lead_time)),
            ]
            .into_iter()
            .collect();

            let mut record = tools::load_or_create_notebook(&notebook_name, state, ctx).await?;
            render_template(&mut record.source, &spi_forecast_template(), &values, None);
            ctx.store.save(record).await?;

            Ok(json!({ "notebook": notebook_name }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_requires_area() {
        let definition = SpiForecastNotebookTool.definition();
        assert_eq!(definition.input_schema["required"], json!(["area"]));
    }
}
