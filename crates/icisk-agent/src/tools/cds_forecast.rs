use std::future::Future;
use std::pin::Pin;

use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::graph::{GraphContext, GraphState};
use crate::llm::types::ToolDefinition;
use crate::names;
use crate::notebook::template::{render_template, RenderValues};
use crate::notebook::templates::cds_forecast_template;
use crate::store::NotebookStore;
use crate::tool::{AgentTool, ToolSession};
use crate::tools::{
    self, first_of_month, months_after, parse_ymd, str_arg, timestamp_slug, today, with_extension,
};

pub const SEASONAL_DATASET: &str = "seasonal-original-single-levels";
pub const GLOFAS_DATASET: &str = "cems-glofas-seasonal";

/// Variables available from the CDS seasonal forecast datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastVariable {
    TotalPrecipitation,
    Temperature,
    RiverDischarge,
}

impl ForecastVariable {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TotalPrecipitation => "total_precipitation",
            Self::Temperature => "temperature",
            Self::RiverDischarge => "glofas",
        }
    }

    /// CDS API name.
    pub fn as_cds(self) -> &'static str {
        match self {
            Self::TotalPrecipitation => "total_precipitation",
            Self::Temperature => "2m_temperature",
            Self::RiverDischarge => "river_discharge_in_the_last_24_hours",
        }
    }

    /// Short name used in I-Cisk collections and file names.
    pub fn as_icisk(self) -> &'static str {
        match self {
            Self::TotalPrecipitation => "tp",
            Self::Temperature => "t2m",
            Self::RiverDischarge => "dis24",
        }
    }

    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "total_precipitation" => Some(Self::TotalPrecipitation),
            "temperature" => Some(Self::Temperature),
            "glofas" | "river_discharge_in_the_last_24_hours" => Some(Self::RiverDischarge),
            _ if alias.contains("prec") => Some(Self::TotalPrecipitation),
            _ if alias.contains("temp") => Some(Self::Temperature),
            _ if alias.contains("glofas") || alias.contains("discharge") => {
                Some(Self::RiverDischarge)
            }
            _ => None,
        }
    }
}

/// The dataset is implied by the variables: river discharge comes from
/// GloFAS, everything else from the seasonal single-levels dataset.
pub fn dataset_from_variables(variables: &[ForecastVariable]) -> &'static str {
    if variables.contains(&ForecastVariable::RiverDischarge) {
        GLOFAS_DATASET
    } else {
        SEASONAL_DATASET
    }
}

fn parse_variables(args: &Map<String, Value>) -> Vec<ForecastVariable> {
    let mut variables = Vec::new();
    if let Some(items) = args.get("forecast_variables").and_then(Value::as_array) {
        for item in items {
            if let Some(variable) = item.as_str().and_then(ForecastVariable::from_alias) {
                if !variables.contains(&variable) {
                    variables.push(variable);
                }
            }
        }
    }
    variables
}

/// Builds a notebook that ingests CDS seasonal forecast data through
/// the I-Cisk API and stores it as zarr.
pub struct CdsForecastNotebookTool;

impl AgentTool for CdsForecastNotebookTool {
    fn definition(&self) -> ToolDefinition {
        let default_init = first_of_month(today()).format("%Y-%m-%d");
        let default_lead = months_after(first_of_month(today()), 1).format("%Y-%m-%d");
        ToolDefinition {
            name: names::CDS_FORECAST_NOTEBOOK_TOOL.into(),
            description: "Useful when user want to get forecast data from the Climate Data Store (CDS) API.\n\
                This tool builds a jupyter notebook to ingest forecast data for a specific region and time period, and saves it in a zarr format.\n\
                This tool returns the path to the output zarr file with the retrieved forecast data and an editable jupyter notebook that was used to build the data ingest procedure.\n\
                If not provided by the user, assign the specified default values to the arguments.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "forecast_variables": {
                        "type": ["array", "null"],
                        "items": { "type": "string" },
                        "description": "List of forecast variables to be retrieved from the CDS API. \
                            Valid values are 'total_precipitation', 'temperature' and 'glofas' (river discharge). \
                            'glofas' cannot be combined with other variables. If not specified use None as default.",
                    },
                    "area": {
                        "type": ["string", "array", "null"],
                        "description": "The area of interest for the forecast data. If not specified use None as default.\n\
                            It could be a bounding-box defined by [min_x, min_y, max_x, max_y] coordinates provided in EPSG:4326 Coordinate Reference System.\n\
                            Otherwise it can be the name of a country, continent, or specific geographic area.",
                    },
                    "init_time": {
                        "type": ["string", "null"],
                        "description": format!("The initial datetime of the forecast provided in UTC-0 YYYY-MM-DD. If not specified use {default_init} as default."),
                    },
                    "lead_time": {
                        "type": ["string", "null"],
                        "description": format!("The lead datetime of the forecast provided in UTC-0 YYYY-MM-DD. It must be after the init_time arg. If not specified use {default_lead} as default."),
                    },
                    "zarr_output": {
                        "type": ["string", "null"],
                        "description": "The path to the output zarr file with the forecast data. It could be a local path or a remote path. If not specified is None.",
                    },
                    "jupyter_notebook": {
                        "type": ["string", "null"],
                        "description": "The path to the jupyter notebook that was used to build the data ingest procedure. If not specified is None.",
                    },
                },
                "required": ["forecast_variables", "area"],
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

            let mut variables = Vec::new();
            if let Some(items) = args.get("forecast_variables").and_then(Value::as_array) {
                let unknown: Vec<&str> = items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|v| ForecastVariable::from_alias(v).is_none())
                    .collect();
                if !unknown.is_empty() {
                    invalid.push((
                        "forecast_variables".into(),
                        format!(
                            "Invalid forecast variables: {unknown:?}. It should be a list of valid \
                             CDS forecast variables: ['total_precipitation', 'temperature', 'glofas']."
                        ),
                    ));
                }
                variables = parse_variables(args);
                if variables.contains(&ForecastVariable::RiverDischarge) && variables.len() > 1 {
                    invalid.push((
                        "forecast_variables".into(),
                        "The 'glofas' (river discharge) variable cannot be retrieved together \
                         with other variables."
                            .into(),
                    ));
                }
            }

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
                        let horizon_months =
                            if variables.contains(&ForecastVariable::RiverDischarge) {
                                1
                            } else {
                                6
                            };
                        if first_of_month(date) > months_after(current_month, horizon_months) {
                            invalid.push((
                                "lead_time".into(),
                                format!(
                                    "Invalid lead time: {lead}. It should be at most {horizon_months} month(s) after the current month."
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
            let variables = parse_variables(&args);
            args.insert(
                "forecast_variables".into(),
                variables.iter().map(|v| v.as_str()).collect::<Vec<_>>().into(),
            );

            // GloFAS runs on a 0.05 degree grid, the seasonal dataset
            // on a 1 degree grid.
            let decimals = if variables.contains(&ForecastVariable::RiverDischarge) {
                1
            } else {
                0
            };
            if let Some(area) = args.get("area") {
                let area = tools::infer_area(area, ctx, session).await?;
                args.insert("area".into(), tools::round_bbox(&area, decimals));
            }

            let init = str_arg(&args, "init_time")
                .and_then(parse_ymd)
                .unwrap_or_else(|| first_of_month(today()));
            let lead = str_arg(&args, "lead_time")
                .and_then(parse_ymd)
                .unwrap_or_else(|| months_after(first_of_month(today()), 1));
            args.insert("init_time".into(), init.format("%Y-%m-%d").to_string().into());
            args.insert("lead_time".into(), lead.format("%Y-%m-%d").to_string().into());

            let var_slug = variables
                .iter()
                .map(|v| v.as_icisk())
                .collect::<Vec<_>>()
                .join("-");
            let zarr = match str_arg(&args, "zarr_output") {
                Some(name) => with_extension(name, ".zarr"),
                None => format!("icisk-ai_cds-forecast-{var_slug}_{}.zarr", timestamp_slug()),
            };
            args.insert("zarr_output".into(), zarr.into());

            let notebook = match str_arg(&args, "jupyter_notebook") {
                Some(name) => with_extension(name, ".ipynb"),
                None => format!("icisk-ai_cds-forecast-{var_slug}_{}.ipynb", timestamp_slug()),
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
            let variables = parse_variables(args);
            if variables.is_empty() {
                return Err(Error::Tool("forecast_variables is not set".into()));
            }
            let dataset = dataset_from_variables(&variables);
            let notebook_name = str_arg(args, "jupyter_notebook")
                .ok_or_else(|| Error::Tool("jupyter_notebook is not set".into()))?
                .to_string();
            let zarr_output = str_arg(args, "zarr_output")
                .ok_or_else(|| Error::Tool("zarr_output is not set".into()))?
                .to_string();
            let area = args.get("area").cloned().unwrap_or(Value::Null);
            let init_time = str_arg(args, "init_time").unwrap_or_default().to_string();
            let lead_time = str_arg(args, "lead_time").unwrap_or_default().to_string();

            let cds_vars: Vec<&str> = variables.iter().map(|v| v.as_cds()).collect();
            let icisk_vars: Vec<&str> = variables.iter().map(|v| v.as_icisk()).collect();
            let dataset_var_name = format!("dataset_cds_forecast_{}", icisk_vars.join("_"));
            let dataset_var_description = format!(
                "\"\"\"\n\
                 Object \"{dataset_var_name}\" is a xarray.Dataset containing forecast values from {init_time} to {lead_time} for this bounding-box: {area}.\n\
                 It has four dimensions named:\n\
                 - 'model': the forecast models,\n\
                 - 'time': forecasted timesteps,\n\
                 - 'lat': list of latitudes,\n\
                 - 'lon': list of longitudes,\n\
                 It has these variables: {icisk_vars:?} representing the {cds_vars:?} forecast data values. Variables have a shape of [model, time, lat, lon].\n\
                 \"\"\""
            );

            let values: RenderValues = [
                ("dataset_name".to_string(), json!(dataset)),
                ("forecast_variables".to_string(), json!(cds_vars)),
                ("area".to_string(), area),
                ("init_time".to_string(), json!(init_time)),
                ("lead_time".to_string(), json!(lead_time)),
                ("zarr_output".to_string(), json!(zarr_output)),
                ("forecast_variables_icisk".to_string(), json!(icisk_vars)),
                ("dataset_var_name".to_string(), json!(dataset_var_name)),
                (
                    "dataset_var_description".to_string(),
                    json!(dataset_var_description),
                ),
            ]
            .into_iter()
            .collect();

            let mut record = tools::load_or_create_notebook(&notebook_name, state, ctx).await?;
            render_template(
                &mut record.source,
                &cds_forecast_template(),
                &values,
                Some(dataset),
            );
            ctx.store.save(record).await?;

            Ok(json!({
                "data_source": zarr_output,
                "notebook": notebook_name,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_aliases_resolve() {
        assert_eq!(
            ForecastVariable::from_alias("precipitation forecast"),
            Some(ForecastVariable::TotalPrecipitation)
        );
        assert_eq!(
            ForecastVariable::from_alias("river discharge"),
            Some(ForecastVariable::RiverDischarge)
        );
        assert_eq!(
            ForecastVariable::from_alias("glofas"),
            Some(ForecastVariable::RiverDischarge)
        );
        assert_eq!(ForecastVariable::from_alias("snow"), None);
    }

    #[test]
    fn dataset_follows_variables() {
        assert_eq!(
            dataset_from_variables(&[ForecastVariable::Temperature]),
            SEASONAL_DATASET
        );
        assert_eq!(
            dataset_from_variables(&[ForecastVariable::RiverDischarge]),
            GLOFAS_DATASET
        );
    }

    #[test]
    fn definition_requires_core_args() {
        let definition = CdsForecastNotebookTool.definition();
        assert_eq!(
            definition.input_schema["required"],
            json!(["forecast_variables", "area"])
        );
    }
}
