use std::io::BufRead;
use std::path::{Path, PathBuf};

use fxhash::FxHashMap as HashMap;
use ndarray::Array2;

use scmetab_core::errors::{DataError, DataResult};
use scmetab_core::utils::get_dynamic_reader;

/// A dense genes-by-cells expression matrix with named axes.
///
/// Built from a Matrix Market triplet directory (`matrix.mtx`,
/// `barcodes.tsv`, `features.tsv`, each optionally gzipped) or assembled
/// from parts. Gene name lookup is first-occurrence-wins when a name is
/// duplicated in the feature file.
#[derive(Debug, Clone)]
pub struct ExprMatrix {
    genes: Vec<String>,
    cells: Vec<String>,
    gene_index: HashMap<String, usize>,
    cell_index: HashMap<String, usize>,
    data: Array2<f64>,
}

impl ExprMatrix {
    pub fn from_parts(
        genes: Vec<String>,
        cells: Vec<String>,
        data: Array2<f64>,
    ) -> DataResult<Self> {
        if data.nrows() != genes.len() || data.ncols() != cells.len() {
            return Err(DataError::ShapeMismatch {
                rows: data.nrows(),
                cols: data.ncols(),
                genes: genes.len(),
                cells: cells.len(),
            });
        }

        let mut gene_index = HashMap::default();
        for (i, gene) in genes.iter().enumerate() {
            gene_index.entry(gene.clone()).or_insert(i);
        }

        let mut cell_index = HashMap::default();
        for (i, cell) in cells.iter().enumerate() {
            if cell_index.insert(cell.clone(), i).is_some() {
                return Err(DataError::DuplicateCell(cell.clone()));
            }
        }

        Ok(ExprMatrix {
            genes,
            cells,
            gene_index,
            cell_index,
            data,
        })
    }

    /// Read a Matrix Market triplet directory.
    pub fn from_mtx_dir(dir: &Path) -> DataResult<Self> {
        let mtx = find_input(dir, &["matrix.mtx"])?;
        let barcodes = find_input(dir, &["barcodes.tsv"])?;
        let features = find_input(dir, &["features.tsv", "genes.tsv"])?;

        let cells = read_id_column(&barcodes, 0)?;
        let genes = read_id_column(&features, 1)?;
        let data = read_mtx(&mtx, genes.len(), cells.len())?;

        ExprMatrix::from_parts(genes, cells, data)
    }

    /// Column-concatenate per-sample matrices, prefixing every barcode with
    /// its sample name. All samples must share the feature list.
    pub fn concat_samples(parts: Vec<(String, ExprMatrix)>) -> DataResult<Self> {
        let mut iter = parts.into_iter();
        let (first_sample, first) = match iter.next() {
            Some(p) => p,
            None => {
                return Err(DataError::MissingFile {
                    dir: ".".to_string(),
                    name: "expression data".to_string(),
                });
            }
        };

        let genes = first.genes.clone();
        let mut cells: Vec<String> = first
            .cells
            .iter()
            .map(|c| format!("{}_{}", first_sample, c))
            .collect();
        let mut columns: Vec<Array2<f64>> = vec![first.data];

        for (sample, part) in iter {
            if part.genes != genes {
                return Err(DataError::FeatureMismatch(sample));
            }
            cells.extend(part.cells.iter().map(|c| format!("{}_{}", sample, c)));
            columns.push(part.data);
        }

        let total: usize = columns.iter().map(|c| c.ncols()).sum();
        let mut data = Array2::zeros((genes.len(), total));
        let mut offset = 0;
        for part in columns {
            let width = part.ncols();
            data.slice_mut(ndarray::s![.., offset..offset + width])
                .assign(&part);
            offset += width;
        }

        ExprMatrix::from_parts(genes, cells, data)
    }

    pub fn n_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn gene_row(&self, gene: &str) -> Option<usize> {
        self.gene_index.get(gene).copied()
    }

    /// Column positions of the given cells. An identifier absent from the
    /// matrix is a [`DataError::UnknownCell`].
    pub fn cell_positions(&self, cells: &[String]) -> DataResult<Vec<usize>> {
        cells
            .iter()
            .map(|c| {
                self.cell_index
                    .get(c)
                    .copied()
                    .ok_or_else(|| DataError::UnknownCell(c.clone()))
            })
            .collect()
    }

    pub fn value(&self, gene_row: usize, cell_col: usize) -> f64 {
        self.data[[gene_row, cell_col]]
    }

    /// Mean expression of the given gene rows in one cell.
    pub fn mean_over_genes(&self, gene_rows: &[usize], cell_col: usize) -> f64 {
        if gene_rows.is_empty() {
            return 0.0;
        }
        let sum: f64 = gene_rows.iter().map(|&g| self.data[[g, cell_col]]).sum();
        sum / gene_rows.len() as f64
    }
}

fn find_input(dir: &Path, stems: &[&str]) -> DataResult<PathBuf> {
    for stem in stems {
        for name in [stem.to_string(), format!("{}.gz", stem)] {
            let candidate = dir.join(&name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(DataError::MissingFile {
        dir: dir.display().to_string(),
        name: stems[0].to_string(),
    })
}

/// Read an identifier per line, preferring `preferred_field` when the line
/// is tab-separated (feature files carry `id<TAB>symbol<TAB>type`).
fn read_id_column(path: &Path, preferred_field: usize) -> DataResult<Vec<String>> {
    let reader = get_dynamic_reader(path)?;
    let mut ids: Vec<String> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let id = fields
            .get(preferred_field)
            .filter(|f| !f.is_empty())
            .unwrap_or(&fields[0]);
        ids.push(id.to_string());
    }

    Ok(ids)
}

fn read_mtx(path: &Path, n_genes: usize, n_cells: usize) -> DataResult<Array2<f64>> {
    let reader = get_dynamic_reader(path)?;
    let mut data = Array2::zeros((n_genes, n_cells));
    let mut saw_dims = false;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let malformed = |reason: String| DataError::MalformedLine {
            path: path.display().to_string(),
            line: index + 1,
            reason,
        };

        if index == 0 {
            if !line.starts_with("%%MatrixMarket") || !line.contains("coordinate") {
                return Err(malformed(
                    "expected a MatrixMarket coordinate header".to_string(),
                ));
            }
            continue;
        }
        if line.starts_with('%') || line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if !saw_dims {
            if fields.len() != 3 {
                return Err(malformed("expected `rows cols nnz`".to_string()));
            }
            let rows: usize = fields[0].parse().map_err(|_| malformed("bad row count".to_string()))?;
            let cols: usize = fields[1].parse().map_err(|_| malformed("bad col count".to_string()))?;
            if rows != n_genes || cols != n_cells {
                return Err(malformed(format!(
                    "matrix is {}x{} but sidecars describe {}x{}",
                    rows, cols, n_genes, n_cells
                )));
            }
            saw_dims = true;
            continue;
        }

        if fields.len() < 2 {
            return Err(malformed("expected `row col [value]`".to_string()));
        }
        let row: usize = fields[0].parse().map_err(|_| malformed("bad row index".to_string()))?;
        let col: usize = fields[1].parse().map_err(|_| malformed("bad col index".to_string()))?;
        let value: f64 = match fields.get(2) {
            Some(v) => v.parse().map_err(|_| malformed("bad value".to_string()))?,
            None => 1.0,
        };

        if row == 0 || row > n_genes || col == 0 || col > n_cells {
            return Err(malformed(format!("entry {} {} out of bounds", row, col)));
        }
        data[[row - 1, col - 1]] = value;
    }

    if !saw_dims {
        return Err(DataError::MalformedLine {
            path: path.display().to_string(),
            line: 1,
            reason: "missing dimensions line".to_string(),
        });
    }

    Ok(data)
}
