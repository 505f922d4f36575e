//! The agent's notebook-building tools.

pub mod cds_forecast;
pub mod cds_historic;
pub mod code_editor;
pub mod spi_forecast;

pub use cds_forecast::CdsForecastNotebookTool;
pub use cds_historic::CdsHistoricNotebookTool;
pub use code_editor::CodeEditorTool;
pub use spi_forecast::SpiForecastNotebookTool;

use chrono::{Datelike, Months, NaiveDate, Utc};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::graph::{GraphContext, GraphState};
use crate::llm::oneshot;
use crate::notebook::Notebook;
use crate::store::{NotebookRecord, NotebookStore};
use crate::tool::ToolSession;

pub(crate) fn floor_decimals(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).floor() / factor
}

pub(crate) fn ceil_decimals(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).ceil() / factor
}

pub(crate) fn parse_ymd(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) fn first_of_month(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

pub(crate) fn months_after(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

pub(crate) fn months_before(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months)).unwrap_or(date)
}

/// Timestamp for default output file names: ISO seconds with `:`
/// replaced so the name is safe on every filesystem.
pub(crate) fn timestamp_slug() -> String {
    Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string()
}

pub(crate) fn str_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

pub(crate) fn as_bbox(value: &Value) -> Option<Vec<f64>> {
    let items = value.as_array()?;
    items.iter().map(Value::as_f64).collect()
}

/// Resolve an area argument. A bounding box passes through; a place
/// name is geocoded through the LLM, which also drops the session's
/// execution confirmation so the user gets to review the guess.
pub(crate) async fn infer_area(
    area: &Value,
    ctx: &GraphContext,
    session: &mut ToolSession,
) -> Result<Value, Error> {
    match area {
        Value::String(name) => {
            let bbox = oneshot::ask_json(
                ctx.provider.as_ref(),
                "",
                &format!(
                    "Please provide the bounding box coordinates for the area: {name} with format \
                     [min_x, min_y, max_x, max_y] in EPSG:4326 Coordinate Reference System.\n\
                     Provide only the coordinates list without any additional text or explanation."
                ),
            )
            .await?
            .ok_or_else(|| Error::Tool(format!("could not geocode area '{name}'")))?;
            session.execution_confirmed = false;
            Ok(bbox)
        }
        other => Ok(other.clone()),
    }
}

/// Round a bounding box outward: floor the min corner, ceil the max.
pub(crate) fn round_bbox(area: &Value, decimals: i32) -> Value {
    match as_bbox(area) {
        Some(bbox) if bbox.len() == 4 => Value::Array(vec![
            floor_decimals(bbox[0], decimals).into(),
            floor_decimals(bbox[1], decimals).into(),
            ceil_decimals(bbox[2], decimals).into(),
            ceil_decimals(bbox[3], decimals).into(),
        ]),
        _ => area.clone(),
    }
}

/// Append `ext` when the name does not already carry it.
pub(crate) fn with_extension(name: &str, ext: &str) -> String {
    if name.ends_with(ext) {
        name.to_string()
    } else {
        format!("{name}{ext}")
    }
}

/// Load the user's notebook from the store, or start a fresh one.
pub(crate) async fn load_or_create_notebook(
    name: &str,
    state: &GraphState,
    ctx: &GraphContext,
) -> Result<NotebookRecord, Error> {
    let author = state.user_id.clone().unwrap_or_default();
    match ctx.store.get(&author, name).await? {
        Some(record) => Ok(record),
        None => Ok(NotebookRecord::new(name, author, Notebook::new())),
    }
}
