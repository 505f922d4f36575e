//! Jupyter notebook model (nbformat v4) and cell templating.

pub mod template;
pub mod templates;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub use template::{render_template, RenderValues};

/// A Jupyter notebook, nbformat v4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub nbformat: u32,
    pub nbformat_minor: u32,
}

impl Notebook {
    pub fn new() -> Self {
        Self {
            cells: Vec::new(),
            metadata: Map::new(),
            nbformat: 4,
            nbformat_minor: 5,
        }
    }
}

impl Default for Notebook {
    fn default() -> Self {
        Self::new()
    }
}

/// A notebook cell. Source is normalized to a single string; the
/// on-disk list-of-lines form is accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: String,
    pub cell_type: CellType,
    #[serde(deserialize_with = "string_or_lines")]
    pub source: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
}

impl Cell {
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cell_type: CellType::Code,
            source: source.into(),
            metadata: Map::new(),
        }
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cell_type: CellType::Markdown,
            source: source.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_flag(mut self, flag: &str, value: Value) -> Self {
        self.metadata.insert(flag.to_string(), value);
        self
    }

    pub fn flag(&self, flag: &str) -> Option<&Value> {
        self.metadata.get(flag)
    }

    pub fn flag_enabled(&self, flag: &str) -> bool {
        matches!(self.metadata.get(flag), Some(Value::Bool(true)))
    }
}

fn string_or_lines<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Source {
        Text(String),
        Lines(Vec<String>),
    }

    Ok(match Source::deserialize(deserializer)? {
        Source::Text(text) => text,
        Source::Lines(lines) => lines.concat(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_notebook_is_nbformat_4() {
        let nb = Notebook::new();
        assert_eq!(nb.nbformat, 4);
        assert!(nb.cells.is_empty());
    }

    #[test]
    fn cell_source_accepts_list_of_lines() {
        let cell: Cell = serde_json::from_value(json!({
            "id": "c1",
            "cell_type": "code",
            "source": ["import xarray as xr\n", "import zarr\n"],
            "metadata": {},
        }))
        .unwrap();
        assert_eq!(cell.source, "import xarray as xr\nimport zarr\n");
    }

    #[test]
    fn cell_source_accepts_plain_string() {
        let cell: Cell = serde_json::from_value(json!({
            "id": "c1",
            "cell_type": "markdown",
            "source": "## Dataset description",
        }))
        .unwrap();
        assert_eq!(cell.cell_type, CellType::Markdown);
        assert_eq!(cell.source, "## Dataset description");
    }

    #[test]
    fn flags_live_in_metadata() {
        let cell = Cell::code("import os").with_flag("check_import", json!(true));
        assert!(cell.flag_enabled("check_import"));
        assert!(!cell.flag_enabled("need_format"));
    }

    #[test]
    fn notebook_roundtrips_through_json() {
        let mut nb = Notebook::new();
        nb.cells.push(Cell::code("print('spi')"));
        let text = serde_json::to_string(&nb).unwrap();
        let back: Notebook = serde_json::from_str(&text).unwrap();
        assert_eq!(back, nb);
    }
}
