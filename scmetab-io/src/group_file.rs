use std::io::BufRead;
use std::path::Path;

use scmetab_core::errors::{DataError, DataResult};
use scmetab_core::utils::get_dynamic_reader;

/// Row name that selects every cell of the metadata table.
pub const ALL_CELLS: &str = "ALL";

/// One row of an externally supplied partition file: a name and the raw
/// cell identifiers listed for it. A row named [`ALL_CELLS`] with no cells
/// stands for the whole table; interpretation happens in the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRow {
    pub name: String,
    pub cells: Vec<String>,
}

/// Read a partition file: one row per named partition, tab-separated as
/// `name<TAB>cell<TAB>cell...`. Duplicate names keep their first occurrence
/// position but are an error. The file may be gzipped.
pub fn read_partition_file(path: &Path) -> DataResult<Vec<PartitionRow>> {
    let reader = get_dynamic_reader(path)?;
    let mut rows: Vec<PartitionRow> = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split('\t');
        let name = fields.next().unwrap_or_default();
        if name.is_empty() {
            return Err(DataError::MalformedLine {
                path: path.display().to_string(),
                line: index + 1,
                reason: "missing partition name".to_string(),
            });
        }

        if rows.iter().any(|r| r.name == name) {
            return Err(DataError::MalformedLine {
                path: path.display().to_string(),
                line: index + 1,
                reason: format!("duplicate partition name `{}`", name),
            });
        }

        let cells: Vec<String> = fields
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();

        rows.push(PartitionRow {
            name: name.to_string(),
            cells,
        });
    }

    Ok(rows)
}
