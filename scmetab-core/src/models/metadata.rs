use fxhash::FxHashMap as HashMap;

use crate::errors::{DataError, DataResult};

/// A typed metadata field.
///
/// Raw fields are typed on load: bool first (`TRUE`/`FALSE`/`true`/`false`),
/// then number, then string. `NA` and the empty string become [`Value::Na`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    Na,
}

impl Value {
    pub fn parse(raw: &str) -> Value {
        let raw = raw.trim();
        match raw {
            "" | "NA" => Value::Na,
            "TRUE" | "true" => Value::Bool(true),
            "FALSE" | "false" => Value::Bool(false),
            _ => match raw.parse::<f64>() {
                Ok(n) => Value::Num(n),
                Err(_) => Value::Str(raw.to_string()),
            },
        }
    }

    pub fn is_na(&self) -> bool {
        matches!(self, Value::Na)
    }

    /// Categorical label for this value, used when an existing column serves
    /// as an identity partition. `Na` has no label.
    pub fn label(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            Value::Num(n) => Some(format!("{}", n)),
            Value::Bool(true) => Some("TRUE".to_string()),
            Value::Bool(false) => Some("FALSE".to_string()),
            Value::Na => None,
        }
    }
}

/// Column-oriented table of per-cell metadata keyed by cell identifier.
///
/// Cell identifiers are unique within the table. When tables from several
/// samples are merged, identifiers are prefixed with the sample name first
/// (see [`CellMetadata::prefix_cells`]) so the invariant survives the merge.
#[derive(Debug, Clone, Default)]
pub struct CellMetadata {
    cells: Vec<String>,
    index: HashMap<String, usize>,
    columns: Vec<String>,
    values: HashMap<String, Vec<Value>>,
}

impl CellMetadata {
    /// Build a table with the given cells and no columns yet.
    pub fn from_cells(cells: Vec<String>) -> DataResult<Self> {
        let mut index = HashMap::default();
        for (i, cell) in cells.iter().enumerate() {
            if index.insert(cell.clone(), i).is_some() {
                return Err(DataError::DuplicateCell(cell.clone()));
            }
        }
        Ok(CellMetadata {
            cells,
            index,
            columns: Vec::new(),
            values: HashMap::default(),
        })
    }

    /// Build a table from row-major data: one `(cell, fields)` pair per row,
    /// with one field per column.
    pub fn from_rows(columns: Vec<String>, rows: Vec<(String, Vec<Value>)>) -> DataResult<Self> {
        let mut table = CellMetadata::from_cells(rows.iter().map(|(c, _)| c.clone()).collect())?;
        let mut column_values: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); columns.len()];

        for (cell, fields) in rows {
            if fields.len() != columns.len() {
                return Err(DataError::RowWidth {
                    cell,
                    expected: columns.len(),
                    found: fields.len(),
                });
            }
            for (slot, value) in column_values.iter_mut().zip(fields) {
                slot.push(value);
            }
        }

        for (name, values) in columns.into_iter().zip(column_values) {
            table.set_column(&name, values)?;
        }
        Ok(table)
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.values.get(name).map(|v| v.as_slice())
    }

    pub fn cell_index(&self, cell: &str) -> Option<usize> {
        self.index.get(cell).copied()
    }

    pub fn cell_id(&self, row: usize) -> &str {
        &self.cells[row]
    }

    /// Value at `(row, column)`; `Na` for a column this table does not have.
    pub fn value(&self, row: usize, column: &str) -> &Value {
        static NA: Value = Value::Na;
        self.values.get(column).map(|v| &v[row]).unwrap_or(&NA)
    }

    /// Replace or append a column. The value vector must have one entry per
    /// cell.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> DataResult<()> {
        if values.len() != self.cells.len() {
            return Err(DataError::RowWidth {
                cell: name.to_string(),
                expected: self.cells.len(),
                found: values.len(),
            });
        }
        if !self.values.contains_key(name) {
            self.columns.push(name.to_string());
        }
        self.values.insert(name.to_string(), values);
        Ok(())
    }

    /// Append the same value to every cell of a column.
    pub fn set_constant_column(&mut self, name: &str, value: Value) -> DataResult<()> {
        self.set_column(name, vec![value; self.cells.len()])
    }

    /// Sorted distinct labels of a column, `Na` excluded.
    pub fn distinct_labels(&self, column: &str) -> Vec<String> {
        let mut labels: Vec<String> = match self.values.get(column) {
            Some(values) => values.iter().filter_map(|v| v.label()).collect(),
            None => return Vec::new(),
        };
        labels.sort();
        labels.dedup();
        labels
    }

    /// Prefix every cell identifier with `<prefix>_`.
    pub fn prefix_cells(&mut self, prefix: &str) {
        self.index.clear();
        for (i, cell) in self.cells.iter_mut().enumerate() {
            *cell = format!("{}_{}", prefix, cell);
            self.index.insert(cell.clone(), i);
        }
    }

    /// Column-filling merge: append the rows of `other` to this table.
    ///
    /// Columns present on only one side are kept and filled with `Na` for
    /// the rows of the other side; no row is ever dropped. Duplicate cell
    /// identifiers across the two tables are an error.
    pub fn merge(&mut self, other: CellMetadata) -> DataResult<()> {
        let n_before = self.cells.len();
        let n_added = other.cells.len();

        for cell in &other.cells {
            if self.index.contains_key(cell) {
                return Err(DataError::DuplicateCell(cell.clone()));
            }
        }

        for (i, cell) in other.cells.iter().enumerate() {
            self.index.insert(cell.clone(), n_before + i);
        }
        self.cells.extend(other.cells.iter().cloned());

        // columns we already have: extend with the other side's values, or Na
        for name in &self.columns {
            let existing = self.values.get_mut(name).unwrap();
            match other.values.get(name) {
                Some(theirs) => existing.extend(theirs.iter().cloned()),
                None => existing.extend(std::iter::repeat(Value::Na).take(n_added)),
            }
        }

        // columns only the other side has: backfill our rows with Na
        for name in &other.columns {
            if self.values.contains_key(name) {
                continue;
            }
            let mut filled = vec![Value::Na; n_before];
            filled.extend(other.values[name].iter().cloned());
            self.columns.push(name.clone());
            self.values.insert(name.clone(), filled);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn table(cells: &[&str], column: &str, raw: &[&str]) -> CellMetadata {
        let rows = cells
            .iter()
            .zip(raw)
            .map(|(c, r)| (c.to_string(), vec![Value::parse(r)]))
            .collect();
        CellMetadata::from_rows(vec![column.to_string()], rows).unwrap()
    }

    #[rstest]
    #[case("TRUE", Value::Bool(true))]
    #[case("false", Value::Bool(false))]
    #[case("3.5", Value::Num(3.5))]
    #[case("NA", Value::Na)]
    #[case("", Value::Na)]
    #[case("pre", Value::Str("pre".to_string()))]
    fn test_value_parse(#[case] raw: &str, #[case] expected: Value) {
        assert_eq!(Value::parse(raw), expected);
    }

    #[rstest]
    fn test_duplicate_cell_rejected() {
        let result = CellMetadata::from_cells(vec!["c1".to_string(), "c1".to_string()]);
        assert!(matches!(result, Err(DataError::DuplicateCell(_))));
    }

    #[rstest]
    fn test_distinct_labels_sorted_na_excluded() {
        let t = table(&["c1", "c2", "c3", "c4"], "cluster", &["2", "1", "NA", "1"]);
        assert_eq!(t.distinct_labels("cluster"), vec!["1", "2"]);
    }

    #[rstest]
    fn test_merge_fills_missing_columns() {
        let mut a = table(&["c1", "c2"], "treatment", &["pre", "pre"]);
        let b = table(&["c3"], "batch", &["b2"]);

        a.merge(b).unwrap();

        assert_eq!(a.n_cells(), 3);
        assert_eq!(a.value(2, "treatment"), &Value::Na);
        assert_eq!(a.value(0, "batch"), &Value::Na);
        assert_eq!(a.value(2, "batch"), &Value::Str("b2".to_string()));
    }

    #[rstest]
    fn test_merge_rejects_duplicate_ids() {
        let mut a = table(&["c1"], "x", &["1"]);
        let b = table(&["c1"], "x", &["2"]);
        assert!(matches!(a.merge(b), Err(DataError::DuplicateCell(_))));
    }

    #[rstest]
    fn test_prefix_cells_keeps_lookup() {
        let mut t = table(&["AAAC", "GGGT"], "x", &["1", "2"]);
        t.prefix_cells("s1");

        assert_eq!(t.cells(), &["s1_AAAC".to_string(), "s1_GGGT".to_string()]);
        assert_eq!(t.cell_index("s1_GGGT"), Some(1));
        assert_eq!(t.cell_index("GGGT"), None);
    }
}
