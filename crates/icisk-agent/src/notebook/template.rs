//! Cell template rendering.
//!
//! Template cells carry flags in their metadata that control how they
//! are instantiated into a notebook:
//!
//! - [`NEED_FORMAT`]: substitute `{placeholder}` occurrences with
//!   values (`{{`/`}}` escape literal braces).
//! - [`CHECK_IMPORT`]: drop import lines already present in cells of
//!   the target notebook that carry the same flag.
//! - [`CHECK_EXISTENCE`]: skip the cell when an identical one is
//!   already in the notebook.
//! - [`MODE`]: keep the cell only when rendering in the named mode.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::{Cell, CellType, Notebook};

pub const NEED_FORMAT: &str = "need_format";
pub const CHECK_IMPORT: &str = "check_import";
pub const CHECK_EXISTENCE: &str = "check_existence";
pub const MODE: &str = "mode";

pub type RenderValues = HashMap<String, Value>;

/// Instantiate a cell template into `notebook`, appending the rendered
/// cells. Returns the number of cells appended.
pub fn render_template(
    notebook: &mut Notebook,
    template: &[Cell],
    values: &RenderValues,
    mode: Option<&str>,
) -> usize {
    let mut appended = 0;

    for template_cell in template {
        if let Some(cell_mode) = template_cell.flag(MODE).and_then(Value::as_str) {
            if mode != Some(cell_mode) {
                continue;
            }
        }

        let mut cell = template_cell.clone();
        cell.source = dedent(&cell.source);

        if cell.flag_enabled(NEED_FORMAT) {
            cell.source = format_placeholders(&cell.source, values);
        }

        if cell.flag_enabled(CHECK_IMPORT) {
            cell.source = drop_known_imports(&cell.source, notebook);
        }

        if cell.flag_enabled(CHECK_EXISTENCE)
            && notebook.cells.iter().any(|c| c.source == cell.source)
        {
            continue;
        }

        if cell.cell_type == CellType::Code && cell.source.trim().is_empty() {
            continue;
        }

        notebook.cells.push(cell);
        appended += 1;
    }

    appended
}

/// Strip the indentation of the first non-empty line from every line,
/// so templates can be written indented in source.
pub fn dedent(source: &str) -> String {
    let indent = source
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| &line[..line.len() - line.trim_start().len()])
        .unwrap_or("");
    if indent.is_empty() {
        return source.trim_matches('\n').to_string();
    }
    source
        .lines()
        .map(|line| line.strip_prefix(indent).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

/// Substitute `{name}` placeholders. `{{` and `}}` escape braces.
pub fn format_placeholders(source: &str, values: &RenderValues) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if closed {
                    match values.get(&name) {
                        Some(value) => out.push_str(&fmt_value(value)),
                        // Unknown placeholders are left as-is so the gap
                        // is visible in the generated notebook.
                        None => {
                            out.push('{');
                            out.push_str(&name);
                            out.push('}');
                        }
                    }
                } else {
                    out.push('{');
                    out.push_str(&name);
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Render a value into Python source text.
///
/// Strings are inserted raw at the top level (templates quote them
/// where needed) and single-quoted inside lists.
pub fn fmt_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(fmt_element).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(_) => value.to_string(),
    }
}

fn fmt_element(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => fmt_value(other),
    }
}

/// Remove lines that already appear in the notebook's [`CHECK_IMPORT`]
/// cells. Covers `import`/`from` lines and their companion `!pip
/// install` lines; a fully duplicated dependency cell empties out and
/// gets dropped.
fn drop_known_imports(source: &str, notebook: &Notebook) -> String {
    let known: HashSet<&str> = notebook
        .cells
        .iter()
        .filter(|cell| cell.flag_enabled(CHECK_IMPORT))
        .flat_map(|cell| cell.source.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    source
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed.is_empty() || !known.contains(trimmed)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, Value)]) -> RenderValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn dedent_strips_common_indent() {
        let source = "\n        import xarray as xr\n        ds = xr.open_zarr(path)\n    ";
        assert_eq!(dedent(source), "import xarray as xr\nds = xr.open_zarr(path)");
    }

    #[test]
    fn format_substitutes_placeholders() {
        let out = format_placeholders(
            "DATASET = '{dataset}'\nAREA = {area}",
            &values(&[
                ("dataset", json!("reanalysis-era5-land")),
                ("area", json!([12.5, 52.0, 14.0, 53.1])),
            ]),
        );
        assert_eq!(
            out,
            "DATASET = 'reanalysis-era5-land'\nAREA = [12.5, 52.0, 14.0, 53.1]"
        );
    }

    #[test]
    fn format_escapes_double_braces() {
        let out = format_placeholders(
            "request = {{'variable': {variables}}}",
            &values(&[("variables", json!(["total_precipitation"]))]),
        );
        assert_eq!(out, "request = {'variable': ['total_precipitation']}");
    }

    #[test]
    fn format_leaves_unknown_placeholders() {
        let out = format_placeholders("x = {unknown}", &values(&[]));
        assert_eq!(out, "x = {unknown}");
    }

    #[test]
    fn fmt_value_python_literals() {
        assert_eq!(fmt_value(&json!(null)), "None");
        assert_eq!(fmt_value(&json!(true)), "True");
        assert_eq!(fmt_value(&json!(1.5)), "1.5");
        assert_eq!(fmt_value(&json!("plain")), "plain");
        assert_eq!(fmt_value(&json!(["tp", "t2m"])), "['tp', 't2m']");
        assert_eq!(fmt_value(&json!([[1, 2], [3, 4]])), "[[1, 2], [3, 4]]");
    }

    #[test]
    fn render_skips_cells_for_other_modes() {
        let template = vec![
            Cell::code("print('a')").with_flag(MODE, json!("reanalysis-era5-land")),
            Cell::code("print('b')").with_flag(MODE, json!("reanalysis-era5-land-monthly-means")),
            Cell::code("print('c')"),
        ];
        let mut nb = Notebook::new();
        let appended = render_template(
            &mut nb,
            &template,
            &values(&[]),
            Some("reanalysis-era5-land"),
        );
        assert_eq!(appended, 2);
        assert_eq!(nb.cells[0].source, "print('a')");
        assert_eq!(nb.cells[1].source, "print('c')");
    }

    #[test]
    fn render_drops_duplicate_imports() {
        let mut nb = Notebook::new();
        render_template(
            &mut nb,
            &[Cell::code("import xarray as xr\nimport zarr").with_flag(CHECK_IMPORT, json!(true))],
            &values(&[]),
            None,
        );
        render_template(
            &mut nb,
            &[Cell::code("import xarray as xr\nimport cdsapi").with_flag(CHECK_IMPORT, json!(true))],
            &values(&[]),
            None,
        );
        assert_eq!(nb.cells[1].source, "import cdsapi");
    }

    #[test]
    fn render_skips_existing_identical_cells() {
        let template =
            vec![Cell::code("CLIENT = cdsapi.Client()").with_flag(CHECK_EXISTENCE, json!(true))];
        let mut nb = Notebook::new();
        assert_eq!(render_template(&mut nb, &template, &values(&[]), None), 1);
        assert_eq!(render_template(&mut nb, &template, &values(&[]), None), 0);
        assert_eq!(nb.cells.len(), 1);
    }

    #[test]
    fn render_drops_empty_code_cells() {
        let mut nb = Notebook::new();
        render_template(
            &mut nb,
            &[Cell::code("import zarr").with_flag(CHECK_IMPORT, json!(true))],
            &values(&[]),
            None,
        );
        // Same imports again: everything is dropped, cell becomes empty.
        let appended = render_template(
            &mut nb,
            &[Cell::code("import zarr").with_flag(CHECK_IMPORT, json!(true))],
            &values(&[]),
            None,
        );
        assert_eq!(appended, 0);
        assert_eq!(nb.cells.len(), 1);
    }
}
