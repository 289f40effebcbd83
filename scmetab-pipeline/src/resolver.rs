use fxhash::FxHashSet as HashSet;

use scmetab_core::errors::DataError;
use scmetab_core::models::{CellMetadata, Group, Subset};
use scmetab_io::group_file::{ALL_CELLS, PartitionRow};

use crate::errors::{ConfigError, ConfigResult};
use crate::expr::Expr;

/// How one dimension partitions cells into named parts.
#[derive(Debug)]
pub enum Partitioner<'a> {
    /// Externally supplied partition rows, used verbatim.
    Input(&'a [PartitionRow]),
    /// Distinct values of an existing categorical column.
    Idents(&'a str),
    /// Named boolean rules evaluated against metadata columns.
    Rules(Vec<(String, Expr)>),
}

/// Parse `name -> expression` pairs into a rule set, rejecting duplicate
/// names and unparseable expressions.
pub fn build_rules(pairs: &[(String, String)]) -> ConfigResult<Vec<(String, Expr)>> {
    let mut rules: Vec<(String, Expr)> = Vec::with_capacity(pairs.len());
    for (name, src) in pairs {
        if rules.iter().any(|(existing, _)| existing == name) {
            return Err(ConfigError::DuplicateRule(name.clone()));
        }
        let expr = Expr::parse(src).map_err(|reason| ConfigError::RuleParse {
            name: name.clone(),
            reason,
        })?;
        rules.push((name.clone(), expr));
    }
    Ok(rules)
}

/// Check a partitioner against the metadata before any computation starts:
/// rule columns and identity columns must exist.
pub fn validate_partitioner(meta: &CellMetadata, partitioner: &Partitioner) -> ConfigResult<()> {
    match partitioner {
        Partitioner::Input(_) => Ok(()),
        Partitioner::Idents(column) => {
            if meta.has_column(column) {
                Ok(())
            } else {
                Err(ConfigError::IdentColumnMissing(column.to_string()))
            }
        }
        Partitioner::Rules(rules) => {
            for (name, expr) in rules {
                for column in expr.columns() {
                    if !meta.has_column(column) {
                        return Err(ConfigError::UnknownColumn {
                            rule: name.clone(),
                            column: column.to_string(),
                        });
                    }
                }
            }
            Ok(())
        }
    }
}

/// A subset that could not be materialized; the run continues without it.
#[derive(Debug)]
pub struct SkippedPartition {
    pub name: String,
    pub error: DataError,
}

/// The outcome of subset resolution: materialized subsets in deterministic
/// order, plus the partitions that had to be skipped.
#[derive(Debug)]
pub struct Resolution {
    pub subsets: Vec<Subset>,
    pub skipped: Vec<SkippedPartition>,
}

impl Resolution {
    /// Every configured partition name, materialized or skipped.
    pub fn known_names(&self) -> Vec<&str> {
        self.subsets
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.skipped.iter().map(|s| s.name.as_str()))
            .collect()
    }

    pub fn subset(&self, name: &str) -> Option<&Subset> {
        self.subsets.iter().find(|s| s.name == name)
    }
}

/// Resolve the subsetting dimension into named cell sets.
///
/// Emission order is deterministic: file order for `Input`, sorted labels
/// for `Idents`, document order for rules. Cells matching no rule are
/// excluded without error; overlapping rules are allowed. A partition that
/// resolves empty, or an `Input` row naming an unknown cell, is recorded as
/// skipped with its [`DataError`] and does not abort the sibling partitions.
pub fn resolve_subsets(
    meta: &CellMetadata,
    partitioner: &Partitioner,
    prefix: Option<&str>,
) -> ConfigResult<Resolution> {
    validate_partitioner(meta, partitioner)?;
    let prefix = prefix.unwrap_or("");

    let mut subsets: Vec<Subset> = Vec::new();
    let mut skipped: Vec<SkippedPartition> = Vec::new();
    let mut push = |name: String, cells: Vec<String>, error: Option<DataError>| {
        match error {
            Some(error) => skipped.push(SkippedPartition { name, error }),
            None if cells.is_empty() => {
                let error = DataError::EmptySubset(name.clone());
                skipped.push(SkippedPartition { name, error });
            }
            None => subsets.push(Subset::new(name, cells)),
        }
    };

    match partitioner {
        Partitioner::Input(rows) => {
            for row in *rows {
                let name = format!("{}{}", prefix, row.name);
                if row.name == ALL_CELLS && row.cells.is_empty() {
                    push(name, meta.cells().to_vec(), None);
                    continue;
                }
                let unknown = row.cells.iter().find(|c| meta.cell_index(c).is_none());
                match unknown {
                    Some(cell) => push(name, Vec::new(), Some(DataError::UnknownCell(cell.clone()))),
                    None => push(name, row.cells.clone(), None),
                }
            }
        }
        Partitioner::Idents(column) => {
            for label in meta.distinct_labels(column) {
                let cells = cells_with_label(meta, column, &label);
                push(format!("{}{}", prefix, label), cells, None);
            }
        }
        Partitioner::Rules(rules) => {
            for (name, expr) in rules {
                let cells: Vec<String> = (0..meta.n_cells())
                    .filter(|&row| expr.eval(meta, row))
                    .map(|row| meta.cell_id(row).to_string())
                    .collect();
                push(format!("{}{}", prefix, name), cells, None);
            }
        }
    }

    Ok(Resolution { subsets, skipped })
}

/// Partition one subset's cells into groups.
///
/// The partitioner must have been validated against the metadata already;
/// this never produces a configuration error. Cells of the subset matching
/// no group are silently excluded from group-level analysis; this mirrors
/// the subsetting semantics and is intentional. Empty groups are dropped,
/// and a subset whose groups are all empty is a [`DataError::NoGroups`].
pub fn resolve_groups(
    meta: &CellMetadata,
    subset: &Subset,
    partitioner: &Partitioner,
    prefix: Option<&str>,
) -> Result<Vec<Group>, DataError> {
    let prefix = prefix.unwrap_or("");
    let member: HashSet<&str> = subset.cells.iter().map(|c| c.as_str()).collect();

    let mut groups: Vec<Group> = Vec::new();
    match partitioner {
        Partitioner::Input(rows) => {
            for row in *rows {
                let cells: Vec<String> = if row.name == ALL_CELLS && row.cells.is_empty() {
                    subset.cells.clone()
                } else {
                    // outside-subset and unknown identifiers simply don't intersect
                    row.cells
                        .iter()
                        .filter(|c| member.contains(c.as_str()))
                        .cloned()
                        .collect()
                };
                if !cells.is_empty() {
                    groups.push(Group::new(format!("{}{}", prefix, row.name), cells));
                }
            }
        }
        Partitioner::Idents(column) => {
            let subset_meta: Vec<usize> = subset
                .cells
                .iter()
                .filter_map(|c| meta.cell_index(c))
                .collect();

            let mut labels: Vec<String> = subset_meta
                .iter()
                .filter_map(|&row| meta.value(row, column).label())
                .collect();
            labels.sort();
            labels.dedup();

            for label in labels {
                let cells: Vec<String> = subset_meta
                    .iter()
                    .filter(|&&row| {
                        meta.value(row, column).label().as_deref() == Some(label.as_str())
                    })
                    .map(|&row| meta.cell_id(row).to_string())
                    .collect();
                groups.push(Group::new(format!("{}{}", prefix, label), cells));
            }
        }
        Partitioner::Rules(rules) => {
            for (name, expr) in rules {
                let cells: Vec<String> = subset
                    .cells
                    .iter()
                    .filter_map(|c| meta.cell_index(c).map(|row| (c, row)))
                    .filter(|&(_, row)| expr.eval(meta, row))
                    .map(|(c, _)| c.clone())
                    .collect();
                if !cells.is_empty() {
                    groups.push(Group::new(format!("{}{}", prefix, name), cells));
                }
            }
        }
    }

    if groups.is_empty() {
        return Err(DataError::NoGroups(subset.name.clone()));
    }
    Ok(groups)
}

fn cells_with_label(meta: &CellMetadata, column: &str, label: &str) -> Vec<String> {
    (0..meta.n_cells())
        .filter(|&row| meta.value(row, column).label().as_deref() == Some(label))
        .map(|row| meta.cell_id(row).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use scmetab_core::models::Value;

    fn meta() -> CellMetadata {
        CellMetadata::from_rows(
            vec!["treatment".to_string(), "cluster".to_string()],
            vec![
                ("c1".to_string(), vec![Value::parse("pre"), Value::parse("1")]),
                ("c2".to_string(), vec![Value::parse("pre"), Value::parse("2")]),
                ("c3".to_string(), vec![Value::parse("post"), Value::parse("1")]),
            ],
        )
        .unwrap()
    }

    fn rule_partitioner(pairs: &[(&str, &str)]) -> Partitioner<'static> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(n, e)| (n.to_string(), e.to_string()))
            .collect();
        Partitioner::Rules(build_rules(&pairs).unwrap())
    }

    #[rstest]
    fn test_rules_resolution() {
        let meta = meta();
        let partitioner = rule_partitioner(&[
            ("pre", "treatment == 'pre'"),
            ("post", "treatment == 'post'"),
        ]);

        let resolution = resolve_subsets(&meta, &partitioner, None).unwrap();

        assert_eq!(resolution.subsets.len(), 2);
        assert_eq!(resolution.subsets[0].name, "pre");
        assert_eq!(resolution.subsets[0].cells, vec!["c1", "c2"]);
        assert_eq!(resolution.subsets[1].cells, vec!["c3"]);
        assert!(resolution.skipped.is_empty());
    }

    #[rstest]
    fn test_overlapping_rules_allowed() {
        let meta = meta();
        let partitioner =
            rule_partitioner(&[("all", "TRUE"), ("pre", "treatment == 'pre'")]);

        let resolution = resolve_subsets(&meta, &partitioner, None).unwrap();

        assert_eq!(resolution.subsets[0].cells.len(), 3);
        assert_eq!(resolution.subsets[1].cells.len(), 2);
    }

    #[rstest]
    fn test_resolved_cells_come_from_metadata() {
        let meta = meta();
        let partitioner =
            rule_partitioner(&[("all", "TRUE"), ("pre", "treatment == 'pre'")]);

        let resolution = resolve_subsets(&meta, &partitioner, None).unwrap();

        for subset in &resolution.subsets {
            for cell in &subset.cells {
                assert!(meta.cell_index(cell).is_some());
            }
        }
    }

    #[rstest]
    fn test_resolution_is_deterministic() {
        let meta = meta();
        let partitioner = rule_partitioner(&[("pre", "treatment == 'pre'")]);

        let first = resolve_subsets(&meta, &partitioner, None).unwrap();
        let second = resolve_subsets(&meta, &partitioner, None).unwrap();
        assert_eq!(first.subsets, second.subsets);
    }

    #[rstest]
    fn test_unknown_column_fails_fast() {
        let meta = meta();
        let partitioner = rule_partitioner(&[("bad", "missing == 1")]);

        let result = resolve_subsets(&meta, &partitioner, None);
        assert!(matches!(
            result,
            Err(ConfigError::UnknownColumn { rule, column }) if rule == "bad" && column == "missing"
        ));
    }

    #[rstest]
    fn test_empty_subset_is_skipped_not_fatal() {
        let meta = meta();
        let partitioner = rule_partitioner(&[
            ("nobody", "treatment == 'during'"),
            ("pre", "treatment == 'pre'"),
        ]);

        let resolution = resolve_subsets(&meta, &partitioner, None).unwrap();

        assert_eq!(resolution.subsets.len(), 1);
        assert_eq!(resolution.skipped.len(), 1);
        assert_eq!(resolution.skipped[0].name, "nobody");
        assert!(matches!(
            resolution.skipped[0].error,
            DataError::EmptySubset(_)
        ));
    }

    #[rstest]
    fn test_duplicate_rule_rejected() {
        let pairs = vec![
            ("a".to_string(), "TRUE".to_string()),
            ("a".to_string(), "FALSE".to_string()),
        ];
        assert!(matches!(
            build_rules(&pairs),
            Err(ConfigError::DuplicateRule(_))
        ));
    }

    #[rstest]
    fn test_idents_resolution_sorted() {
        let meta = meta();
        let partitioner = Partitioner::Idents("cluster");

        let resolution = resolve_subsets(&meta, &partitioner, Some("cluster_")).unwrap();

        assert_eq!(resolution.subsets[0].name, "cluster_1");
        assert_eq!(resolution.subsets[0].cells, vec!["c1", "c3"]);
        assert_eq!(resolution.subsets[1].name, "cluster_2");
    }

    #[rstest]
    fn test_input_rows_verbatim_and_all() {
        let meta = meta();
        let rows = vec![
            PartitionRow {
                name: "ALL".to_string(),
                cells: vec![],
            },
            PartitionRow {
                name: "picked".to_string(),
                cells: vec!["c3".to_string(), "c1".to_string()],
            },
            PartitionRow {
                name: "ghost".to_string(),
                cells: vec!["c9".to_string()],
            },
        ];
        let partitioner = Partitioner::Input(&rows);

        let resolution = resolve_subsets(&meta, &partitioner, None).unwrap();

        assert_eq!(resolution.subsets[0].cells.len(), 3);
        assert_eq!(resolution.subsets[1].cells, vec!["c3", "c1"]);
        assert_eq!(resolution.skipped.len(), 1);
        assert!(matches!(
            resolution.skipped[0].error,
            DataError::UnknownCell(_)
        ));
    }

    #[rstest]
    fn test_groups_within_subset() {
        let meta = meta();
        let subset = Subset::new("pre", vec!["c1".to_string(), "c2".to_string()]);
        let partitioner = Partitioner::Idents("cluster");

        let groups = resolve_groups(&meta, &subset, &partitioner, None).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "1");
        assert_eq!(groups[0].cells, vec!["c1"]);
        assert_eq!(groups[1].cells, vec!["c2"]);
    }

    #[rstest]
    fn test_no_groups_is_data_error() {
        let meta = meta();
        let subset = Subset::new("pre", vec!["c1".to_string()]);
        let partitioner = rule_partitioner(&[("none", "cluster > 10")]);

        let result = resolve_groups(&meta, &subset, &partitioner, None);
        assert!(matches!(result, Err(DataError::NoGroups(_))));
    }
}
