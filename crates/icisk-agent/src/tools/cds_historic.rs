use std::future::Future;
use std::pin::Pin;

use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::graph::{GraphContext, GraphState};
use crate::llm::types::ToolDefinition;
use crate::names;
use crate::notebook::template::{render_template, RenderValues};
use crate::notebook::templates::cds_historic_template;
use crate::store::NotebookStore;
use crate::tool::{AgentTool, ToolSession};
use crate::tools::{
    self, first_of_month, months_before, parse_ymd, str_arg, timestamp_slug, today, with_extension,
};

/// CDS historic datasets the ingestor notebook can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoricDataset {
    MonthlyMeans,
    Hourly,
}

impl HistoricDataset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MonthlyMeans => "reanalysis-era5-land-monthly-means",
            Self::Hourly => "reanalysis-era5-land",
        }
    }

    /// Accepts canonical names plus loose aliases ("monthly data",
    /// "hourly era5").
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "reanalysis-era5-land-monthly-means" | "reanalysis_era5_land_monthly_means" => {
                Some(Self::MonthlyMeans)
            }
            "reanalysis-era5-land" | "reanalysis_era5_land" => Some(Self::Hourly),
            _ if alias.contains("month") => Some(Self::MonthlyMeans),
            _ if alias.contains("hour") => Some(Self::Hourly),
            _ => None,
        }
    }
}

/// Variables available from the historic datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoricVariable {
    TotalPrecipitation,
    Temperature,
}

impl HistoricVariable {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TotalPrecipitation => "total_precipitation",
            Self::Temperature => "temperature",
        }
    }

    /// CDS API name.
    pub fn as_cds(self) -> &'static str {
        match self {
            Self::TotalPrecipitation => "total_precipitation",
            Self::Temperature => "2m_temperature",
        }
    }

    /// Short name used in I-Cisk collections and file names.
    pub fn as_icisk(self) -> &'static str {
        match self {
            Self::TotalPrecipitation => "tp",
            Self::Temperature => "t2m",
        }
    }

    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "total_precipitation" => Some(Self::TotalPrecipitation),
            "temperature" => Some(Self::Temperature),
            _ if alias.contains("prec") => Some(Self::TotalPrecipitation),
            _ if alias.contains("temp") => Some(Self::Temperature),
            _ => None,
        }
    }
}

fn parse_variables(args: &Map<String, Value>) -> Vec<HistoricVariable> {
    let mut variables = Vec::new();
    if let Some(items) = args.get("historic_variables").and_then(Value::as_array) {
        for item in items {
            if let Some(variable) = item.as_str().and_then(HistoricVariable::from_alias) {
                if !variables.contains(&variable) {
                    variables.push(variable);
                }
            }
        }
    }
    variables
}

/// Builds a notebook that ingests CDS historic data through the
/// I-Cisk API and stores it as zarr.
pub struct CdsHistoricNotebookTool;

impl AgentTool for CdsHistoricNotebookTool {
    fn definition(&self) -> ToolDefinition {
        let default_start = months_before(first_of_month(today()), 2).format("%Y-%m-%d");
        let default_end = months_before(first_of_month(today()), 1).format("%Y-%m-%d");
        ToolDefinition {
            name: names::CDS_HISTORIC_NOTEBOOK_TOOL.into(),
            description: "Useful when user want to get historic data from the Climate Data Store (CDS) API.\n\
                This tool builds a jupyter notebook to ingest historic data for a specific region and time period, and saves it in a zarr format.\n\
                This tool returns the path to the output zarr file with the retrieved historic data and an editable jupyter notebook that was used to build the data ingest procedure.\n\
                If not provided by the user, assign the specified default values to the arguments.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "historic_dataset": {
                        "type": ["string", "null"],
                        "description": "The historic dataset to be used for the data retrieval. If not specified use None as default.\n\
                            It could be one of the following:\n\
                            - 'reanalysis-era5-land-monthly-means': to get monthly means data from the Climate Data Store (CDS) API.\n\
                            - 'reanalysis-era5-land': to get hourly data from the Climate Data Store (CDS) API.",
                    },
                    "historic_variables": {
                        "type": ["array", "null"],
                        "items": { "type": "string" },
                        "description": "List of historic variables to be retrieved from the CDS API. \
                            Valid values are 'total_precipitation' and 'temperature'. If not specified use None as default.",
                    },
                    "area": {
                        "type": ["string", "array", "null"],
                        "description": "The area of interest for the historic data. If not specified use None as default.\n\
                            It could be a bounding-box defined by [min_x, min_y, max_x, max_y] coordinates provided in EPSG:4326 Coordinate Reference System.\n\
                            Otherwise it can be the name of a country, continent, or specific geographic area.",
                    },
                    "start_time": {
                        "type": ["string", "null"],
                        "description": format!("The start datetime provided in UTC-0 YYYY-MM-DD. If not specified use {default_start} as default."),
                    },
                    "end_time": {
                        "type": ["string", "null"],
                        "description": format!("The end date provided in UTC-0 YYYY-MM-DD. It must be after the start_time arg. If not specified use {default_end} as default."),
                    },
                    "zarr_output": {
                        "type": ["string", "null"],
                        "description": "The path to the output zarr file with the historic data. It could be a local path or a remote path. If not specified is None.",
                    },
                    "jupyter_notebook": {
                        "type": ["string", "null"],
                        "description": "The path to the jupyter notebook that was used to build the data ingest procedure. If not specified is None.",
                    },
                },
                "required": ["historic_dataset", "historic_variables", "area"],
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

            if let Some(dataset) = str_arg(args, "historic_dataset") {
                if HistoricDataset::from_alias(dataset).is_none() {
                    invalid.push((
                        "historic_dataset".into(),
                        format!(
                            "Invalid historic dataset: {dataset}. It should be one of: \
                             'reanalysis-era5-land-monthly-means', 'reanalysis-era5-land'."
                        ),
                    ));
                }
            }

            if let Some(variables) = args.get("historic_variables").and_then(Value::as_array) {
                let unknown: Vec<&str> = variables
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|v| HistoricVariable::from_alias(v).is_none())
                    .collect();
                if !unknown.is_empty() {
                    invalid.push((
                        "historic_variables".into(),
                        format!(
                            "Invalid historic variables: {unknown:?}. It should be a list of valid \
                             CDS historic variables: ['total_precipitation', 'temperature']."
                        ),
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

            if let Some(start) = str_arg(args, "start_time") {
                match parse_ymd(start) {
                    None => invalid.push((
                        "start_time".into(),
                        format!("Invalid start time: {start}. It should be in the format YYYY-MM-DD."),
                    )),
                    Some(date) if date > current_month => invalid.push((
                        "start_time".into(),
                        format!(
                            "Invalid start time: {start}. It should be in the past, at least in the previous month."
                        ),
                    )),
                    Some(_) => {}
                }
            }

            if let Some(end) = str_arg(args, "end_time") {
                match parse_ymd(end) {
                    None => invalid.push((
                        "end_time".into(),
                        format!("Invalid end time: {end}. It should be in the format YYYY-MM-DD."),
                    )),
                    Some(date) => {
                        if let Some(start) = str_arg(args, "start_time").and_then(parse_ymd) {
                            if first_of_month(date) <= first_of_month(start) {
                                invalid.push((
                                    "end_time".into(),
                                    format!(
                                        "Invalid end time: {end}. It should be at least one month after the start time."
                                    ),
                                ));
                            }
                        }
                        if date >= current_month {
                            invalid.push((
                                "end_time".into(),
                                format!(
                                    "Invalid end time: {end}. It should be at least in the previous month with respect to the current date."
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
            if let Some(dataset) = str_arg(&args, "historic_dataset")
                .and_then(HistoricDataset::from_alias)
            {
                args.insert("historic_dataset".into(), dataset.as_str().into());
            }

            let variables = parse_variables(&args);
            args.insert(
                "historic_variables".into(),
                variables.iter().map(|v| v.as_str()).collect::<Vec<_>>().into(),
            );

            if let Some(area) = args.get("area") {
                let area = tools::infer_area(area, ctx, session).await?;
                args.insert("area".into(), tools::round_bbox(&area, 1));
            }

            let mut start = str_arg(&args, "start_time")
                .and_then(parse_ymd)
                .unwrap_or_else(|| months_before(first_of_month(today()), 2));
            let end = str_arg(&args, "end_time")
                .and_then(parse_ymd)
                .unwrap_or_else(|| months_before(first_of_month(today()), 1));
            if start > end {
                start = end;
            }
            args.insert("start_time".into(), start.format("%Y-%m-%d").to_string().into());
            args.insert("end_time".into(), end.format("%Y-%m-%d").to_string().into());

            let var_slug = variables
                .iter()
                .map(|v| v.as_icisk())
                .collect::<Vec<_>>()
                .join("-");
            let zarr = match str_arg(&args, "zarr_output") {
                Some(name) => with_extension(name, ".zarr"),
                None => format!("icisk-ai_cds-historic-{var_slug}_{}.zarr", timestamp_slug()),
            };
            args.insert("zarr_output".into(), zarr.into());

            let notebook = match str_arg(&args, "jupyter_notebook") {
                Some(name) => with_extension(name, ".ipynb"),
                None => format!("icisk-ai_cds-historic-{var_slug}_{}.ipynb", timestamp_slug()),
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
            let dataset = str_arg(args, "historic_dataset")
                .and_then(HistoricDataset::from_alias)
                .ok_or_else(|| Error::Tool("historic_dataset is not set".into()))?;
            let variables = parse_variables(args);
            let notebook_name = str_arg(args, "jupyter_notebook")
                .ok_or_else(|| Error::Tool("jupyter_notebook is not set".into()))?
                .to_string();
            let zarr_output = str_arg(args, "zarr_output")
                .ok_or_else(|| Error::Tool("zarr_output is not set".into()))?
                .to_string();
            let area = args.get("area").cloned().unwrap_or(Value::Null);
            let start_time = str_arg(args, "start_time").unwrap_or_default().to_string();
            let end_time = str_arg(args, "end_time").unwrap_or_default().to_string();

            let cds_vars: Vec<&str> = variables.iter().map(|v| v.as_cds()).collect();
            let icisk_vars: Vec<&str> = variables.iter().map(|v| v.as_icisk()).collect();
            let dataset_var_name = format!("dataset_cds_historic_{}", icisk_vars.join("_"));
            let dataset_var_description = format!(
                "\"\"\"\n\
                 Object \"{dataset_var_name}\" is a xarray.Dataset containing historic values from {start_time} to {end_time} for this bounding-box: {area}.\n\
                 It has three dimensions named:\n\
                 - 'time': historic timesteps\n\
                 - 'lat': list of latitudes,\n\
                 - 'lon': list of longitudes,\n\
                 It has these variables: {icisk_vars:?} representing the {cds_vars:?} historic data values. Variables have a shape of [time, lat, lon].\n\
                 \"\"\""
            );

            let values: RenderValues = [
                ("historic_dataset".to_string(), json!(dataset.as_str())),
                ("historic_variables".to_string(), json!(cds_vars)),
                ("area".to_string(), area),
                ("start_time".to_string(), json!(start_time)),
                ("end_time".to_string(), json!(end_time)),
                ("zarr_output".to_string(), json!(zarr_output)),
                ("historic_variables_icisk".to_string(), json!(icisk_vars)),
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
                &cds_historic_template(),
                &values,
                Some(dataset.as_str()),
            );
            ctx.store.save(record).await?;

            Ok(json!({
                "data_source": zarr_output,
                "notebook": notebook_name,
            }))
        })
    }
}
