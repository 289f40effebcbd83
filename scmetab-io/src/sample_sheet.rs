use std::io::BufRead;
use std::path::{Path, PathBuf};

use scmetab_core::errors::{DataError, DataResult};
use scmetab_core::models::{CellMetadata, Value};
use scmetab_core::utils::get_dynamic_reader;

use crate::matrix::ExprMatrix;
use crate::metadata::read_cell_metadata;

pub const SAMPLE_COLUMN: &str = "Sample";
pub const DATA_DIR_COLUMN: &str = "DataDir";

/// One sample of the sheet: name, expression data location, and any extra
/// columns the sheet carries (broadcast to every cell of the sample).
#[derive(Debug, Clone)]
pub struct SampleRecord {
    pub sample: String,
    pub data_dir: PathBuf,
    pub extra: Vec<(String, Value)>,
}

/// The per-sample metadata table driving a run.
#[derive(Debug, Clone)]
pub struct SampleSheet {
    pub samples: Vec<SampleRecord>,
}

impl SampleSheet {
    /// Read a tab-separated sample sheet. `Sample` and `DataDir` columns are
    /// required; relative `DataDir` paths are resolved against the sheet's
    /// own directory.
    pub fn from_file(path: &Path) -> DataResult<Self> {
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

        let columns: Vec<String> = header.split('\t').map(String::from).collect();
        let sample_at = columns
            .iter()
            .position(|c| c == SAMPLE_COLUMN)
            .ok_or_else(|| DataError::MissingColumn(SAMPLE_COLUMN.to_string()))?;
        let dir_at = columns
            .iter()
            .position(|c| c == DATA_DIR_COLUMN)
            .ok_or_else(|| DataError::MissingColumn(DATA_DIR_COLUMN.to_string()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut samples: Vec<SampleRecord> = Vec::new();

        for (index, line) in lines {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != columns.len() {
                return Err(DataError::MalformedLine {
                    path: path.display().to_string(),
                    line: index + 1,
                    reason: format!("expected {} fields, found {}", columns.len(), fields.len()),
                });
            }

            let sample = fields[sample_at].to_string();
            if samples.iter().any(|s| s.sample == sample) {
                return Err(DataError::MalformedLine {
                    path: path.display().to_string(),
                    line: index + 1,
                    reason: format!("duplicate sample `{}`", sample),
                });
            }

            let raw_dir = Path::new(fields[dir_at]);
            let data_dir = if raw_dir.is_absolute() {
                raw_dir.to_path_buf()
            } else {
                base.join(raw_dir)
            };

            let extra: Vec<(String, Value)> = columns
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != sample_at && *i != dir_at)
                .map(|(i, name)| (name.clone(), Value::parse(fields[i])))
                .collect();

            samples.push(SampleRecord {
                sample,
                data_dir,
                extra,
            });
        }

        Ok(SampleSheet { samples })
    }
}

/// Load every sample of the sheet and merge into one metadata table and one
/// expression matrix.
///
/// Each sample directory holds a Matrix Market triplet set and, optionally,
/// a `cells.tsv[.gz]` per-cell metadata table. Cell identifiers are prefixed
/// with `<sample>_` before merging so they stay unique across samples; cells
/// without a metadata row, and columns a sample does not have, are filled
/// with `NA`.
pub fn load_samples(sheet: &SampleSheet) -> DataResult<(CellMetadata, ExprMatrix)> {
    let mut merged_meta = CellMetadata::default();
    let mut matrices: Vec<(String, ExprMatrix)> = Vec::new();

    for record in &sheet.samples {
        let matrix = ExprMatrix::from_mtx_dir(&record.data_dir)?;

        let mut table = CellMetadata::from_cells(matrix.cells().to_vec())?;
        if let Some(cells_file) = find_cells_file(&record.data_dir) {
            let per_cell = read_cell_metadata(&cells_file)?;
            for column in per_cell.columns().to_vec() {
                let values: Vec<Value> = matrix
                    .cells()
                    .iter()
                    .map(|cell| match per_cell.cell_index(cell) {
                        Some(row) => per_cell.value(row, &column).clone(),
                        None => Value::Na,
                    })
                    .collect();
                table.set_column(&column, values)?;
            }
        }

        table.set_constant_column("sample", Value::Str(record.sample.clone()))?;
        for (name, value) in &record.extra {
            table.set_constant_column(name, value.clone())?;
        }

        table.prefix_cells(&record.sample);
        merged_meta.merge(table)?;
        matrices.push((record.sample.clone(), matrix));
    }

    let merged_matrix = ExprMatrix::concat_samples(matrices)?;
    Ok((merged_meta, merged_matrix))
}

fn find_cells_file(dir: &Path) -> Option<PathBuf> {
    for name in ["cells.tsv", "cells.tsv.gz"] {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn write_sample_dir(dir: &Path, expr: &[(&str, &str, f64)], cells: Option<&str>) {
        std::fs::create_dir_all(dir).unwrap();
        let genes: Vec<&str> = {
            let mut g: Vec<&str> = expr.iter().map(|(g, _, _)| *g).collect();
            g.dedup();
            g
        };
        let barcodes: Vec<&str> = {
            let mut b: Vec<&str> = expr.iter().map(|(_, b, _)| *b).collect();
            b.sort();
            b.dedup();
            b
        };

        let mut mtx = format!(
            "%%MatrixMarket matrix coordinate real general\n{} {} {}\n",
            genes.len(),
            barcodes.len(),
            expr.len()
        );
        for (gene, barcode, value) in expr {
            let row = genes.iter().position(|g| g == gene).unwrap() + 1;
            let col = barcodes.iter().position(|b| b == barcode).unwrap() + 1;
            mtx.push_str(&format!("{} {} {}\n", row, col, value));
        }

        std::fs::write(dir.join("matrix.mtx"), mtx).unwrap();
        std::fs::write(dir.join("barcodes.tsv"), barcodes.join("\n")).unwrap();
        std::fs::write(dir.join("features.tsv"), genes.join("\n")).unwrap();
        if let Some(cells) = cells {
            std::fs::write(dir.join("cells.tsv"), cells).unwrap();
        }
    }

    #[rstest]
    fn test_sheet_requires_sample_and_datadir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.tsv");
        std::fs::write(&path, "Sample\tSomewhere\ns1\tx\n").unwrap();

        let result = SampleSheet::from_file(&path);
        assert!(matches!(result, Err(DataError::MissingColumn(_))));
    }

    #[rstest]
    fn test_load_samples_merges_and_prefixes() {
        let dir = tempfile::tempdir().unwrap();

        write_sample_dir(
            &dir.path().join("s1"),
            &[("g1", "AAAC", 2.0), ("g2", "AAAC", 1.0)],
            Some("cell\tcluster\nAAAC\t1\n"),
        );
        write_sample_dir(
            &dir.path().join("s2"),
            &[("g1", "GGGT", 4.0), ("g2", "GGGT", 3.0)],
            None,
        );

        let sheet_path = dir.path().join("samples.tsv");
        std::fs::write(
            &sheet_path,
            "Sample\tDataDir\ttreatment\ns1\ts1\tpre\ns2\ts2\tpost\n",
        )
        .unwrap();

        let sheet = SampleSheet::from_file(&sheet_path).unwrap();
        let (meta, matrix) = load_samples(&sheet).unwrap();

        assert_eq!(meta.n_cells(), 2);
        assert_eq!(matrix.n_cells(), 2);
        assert_eq!(meta.cells(), &["s1_AAAC".to_string(), "s2_GGGT".to_string()]);

        let s1 = meta.cell_index("s1_AAAC").unwrap();
        let s2 = meta.cell_index("s2_GGGT").unwrap();
        assert_eq!(meta.value(s1, "treatment"), &Value::Str("pre".to_string()));
        assert_eq!(meta.value(s1, "cluster"), &Value::Num(1.0));
        // s2 has no cells.tsv: the cluster column is Na-filled, never dropped
        assert_eq!(meta.value(s2, "cluster"), &Value::Na);

        let col = matrix.cell_positions(&["s2_GGGT".to_string()]).unwrap()[0];
        let row = matrix.gene_row("g1").unwrap();
        assert_eq!(matrix.value(row, col), 4.0);
    }
}
