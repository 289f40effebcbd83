use std::io::BufRead;
use std::path::Path;

use fxhash::FxHashSet as HashSet;

use scmetab_core::errors::{DataError, DataResult};
use scmetab_core::utils::get_dynamic_reader;

/// One gene set from a GMT file: name, description, member genes.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneSet {
    pub name: String,
    pub description: String,
    pub genes: Vec<String>,
}

/// A collection of gene sets, in file order.
#[derive(Debug, Clone, Default)]
pub struct GeneSetCollection {
    pub sets: Vec<GeneSet>,
}

impl GeneSetCollection {
    /// Parse a GMT file: one set per line, tab-separated as
    /// `name<TAB>description<TAB>gene...`. The file may be gzipped.
    pub fn from_file(path: &Path) -> DataResult<Self> {
        let reader = get_dynamic_reader(path)?;
        let mut sets: Vec<GeneSet> = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split('\t');
            let name = fields.next().unwrap_or_default();
            let description = fields.next();

            if name.is_empty() || description.is_none() {
                return Err(DataError::MalformedLine {
                    path: path.display().to_string(),
                    line: index + 1,
                    reason: "expected at least name and description fields".to_string(),
                });
            }

            let genes: Vec<String> = fields
                .filter(|g| !g.is_empty())
                .map(String::from)
                .collect();

            sets.push(GeneSet {
                name: name.to_string(),
                description: description.unwrap().to_string(),
                genes,
            });
        }

        Ok(GeneSetCollection { sets })
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Restrict every set to the genes present in `universe`, dropping sets
    /// that retain fewer than `min_genes` members.
    ///
    /// Returns the filtered collection and the number of dropped sets;
    /// dropping is reported, never an error. An entirely empty result is a
    /// [`DataError::EmptyGeneSets`].
    pub fn filter_to_universe(
        &self,
        universe: &HashSet<&str>,
        min_genes: usize,
    ) -> DataResult<(GeneSetCollection, usize)> {
        let mut kept: Vec<GeneSet> = Vec::new();
        let mut dropped = 0_usize;

        for set in &self.sets {
            let genes: Vec<String> = set
                .genes
                .iter()
                .filter(|g| universe.contains(g.as_str()))
                .cloned()
                .collect();

            if genes.len() < min_genes {
                dropped += 1;
                continue;
            }

            kept.push(GeneSet {
                name: set.name.clone(),
                description: set.description.clone(),
                genes,
            });
        }

        if kept.is_empty() {
            return Err(DataError::EmptyGeneSets);
        }

        Ok((GeneSetCollection { sets: kept }, dropped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::path::PathBuf;

    #[fixture]
    fn gmt_path() -> PathBuf {
        PathBuf::from("../tests/data/pathways.gmt")
    }

    #[rstest]
    fn test_parse_gmt(gmt_path: PathBuf) {
        let collection = GeneSetCollection::from_file(&gmt_path).unwrap();

        assert_eq!(collection.len(), 3);
        assert_eq!(collection.sets[0].name, "GLYCOLYSIS");
        assert_eq!(collection.sets[0].genes.len(), 4);
    }

    #[rstest]
    fn test_filter_to_universe(gmt_path: PathBuf) {
        let collection = GeneSetCollection::from_file(&gmt_path).unwrap();
        let universe: HashSet<&str> = ["HK1", "PFKL", "ENO1", "CS", "IDH1"]
            .into_iter()
            .collect();

        let (filtered, dropped) = collection.filter_to_universe(&universe, 2).unwrap();

        // OXPHOS keeps CS and IDH1, GLYCOLYSIS keeps three genes, FAO drops
        assert_eq!(filtered.len(), 2);
        assert_eq!(dropped, 1);
        assert_eq!(filtered.sets[0].genes, vec!["HK1", "PFKL", "ENO1"]);
    }

    #[rstest]
    fn test_all_sets_dropped_is_error(gmt_path: PathBuf) {
        let collection = GeneSetCollection::from_file(&gmt_path).unwrap();
        let universe: HashSet<&str> = HashSet::default();

        let result = collection.filter_to_universe(&universe, 1);
        assert!(matches!(result, Err(DataError::EmptyGeneSets)));
    }

    #[rstest]
    fn test_missing_description_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.gmt");
        std::fs::write(&path, "LONELY\n").unwrap();

        let result = GeneSetCollection::from_file(&path);
        assert!(matches!(result, Err(DataError::MalformedLine { .. })));
    }
}
