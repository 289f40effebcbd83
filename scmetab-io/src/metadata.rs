use std::io::BufRead;
use std::path::Path;

use scmetab_core::errors::{DataError, DataResult};
use scmetab_core::models::{CellMetadata, Value};
use scmetab_core::utils::get_dynamic_reader;

/// Read a per-cell metadata table from a tab-separated file.
///
/// The first column holds the cell identifier (its header name is free),
/// every further header names a metadata column. Fields are typed with
/// [`Value::parse`]. The file may be gzipped.
pub fn read_cell_metadata(path: &Path) -> DataResult<CellMetadata> {
    let reader = get_dynamic_reader(path)?;
    let mut lines = reader.lines().enumerate();

    let header = match lines.next() {
        Some((_, line)) => line?,
        None => {
            return Err(DataError::MalformedLine {
                path: path.display().to_string(),
                line: 1,
                reason: "empty file".to_string(),
            });
        }
    };

    let columns: Vec<String> = header.split('\t').skip(1).map(String::from).collect();
    let mut rows: Vec<(String, Vec<Value>)> = Vec::new();

    for (index, line) in lines {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split('\t');
        let cell = fields.next().unwrap_or_default();
        if cell.is_empty() {
            return Err(DataError::MalformedLine {
                path: path.display().to_string(),
                line: index + 1,
                reason: "missing cell identifier".to_string(),
            });
        }

        let values: Vec<Value> = fields.map(Value::parse).collect();
        if values.len() != columns.len() {
            return Err(DataError::MalformedLine {
                path: path.display().to_string(),
                line: index + 1,
                reason: format!("expected {} fields, found {}", columns.len(), values.len()),
            });
        }
        rows.push((cell.to_string(), values));
    }

    CellMetadata::from_rows(columns, rows)
}
