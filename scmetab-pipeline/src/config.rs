use std::fs::read_to_string;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{ConfigError, ConfigResult};

/// Partition modes that delegate the rule set elsewhere: `Input` uses an
/// externally supplied partition file verbatim, `Idents` uses an existing
/// categorical metadata column.
#[derive(Deserialize, Debug, PartialEq, Clone, Copy)]
pub enum RuleMode {
    Input,
    Idents,
}

/// How one dimension (grouping or subsetting) partitions cells: a named
/// mode, or a table of `name = "boolean expression"` rules.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum RuleSpec {
    Mode(RuleMode),
    Rules(toml::value::Table),
}

impl RuleSpec {
    /// Named expressions in document order, or `None` for the named modes.
    pub fn rules(&self, key: &str) -> ConfigResult<Option<Vec<(String, String)>>> {
        match self {
            RuleSpec::Mode(_) => Ok(None),
            RuleSpec::Rules(table) => {
                let mut rules = Vec::with_capacity(table.len());
                for (name, value) in table {
                    let expr = value.as_str().ok_or_else(|| ConfigError::BadValue {
                        key: format!("{}.{}", key, name),
                        reason: "rule must be a string expression".to_string(),
                    })?;
                    rules.push((name.clone(), expr.to_string()));
                }
                Ok(Some(rules))
            }
        }
    }
}

/// Knobs for the default scorer and tester.
#[derive(Deserialize, Debug, Clone)]
pub struct ScoringConfig {
    /// Minimum genes a set must retain against the expression matrix.
    #[serde(default = "default_min_genes")]
    pub min_genes: usize,
    /// Label permutations for activity significance; 0 disables the test.
    #[serde(default = "default_n_perm")]
    pub n_perm: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            min_genes: default_min_genes(),
            n_perm: default_n_perm(),
            seed: default_seed(),
        }
    }
}

fn default_grouping_name() -> String {
    "Group".to_string()
}

fn default_min_genes() -> usize {
    5
}

fn default_n_perm() -> usize {
    1000
}

fn default_seed() -> u64 {
    8525
}

/// The TOML pipeline configuration.
///
/// Table order is preserved on load: subsets, groups and designs are
/// resolved and reported in the order they are written in the document.
#[derive(Deserialize, Debug)]
pub struct PipelineConfig {
    /// Output label for the grouping dimension.
    #[serde(default = "default_grouping_name")]
    pub grouping_name: String,
    pub grouping: RuleSpec,
    /// Identity column used when `grouping = "Idents"`.
    #[serde(default)]
    pub grouping_column: Option<String>,
    /// Optional prefix applied to every resolved group name.
    #[serde(default)]
    pub grouping_prefix: Option<String>,
    pub subsetting: RuleSpec,
    #[serde(default)]
    pub subsetting_column: Option<String>,
    #[serde(default)]
    pub subsetting_prefix: Option<String>,
    /// Named comparisons between resolved subsets.
    #[serde(default)]
    pub design: toml::value::Table,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let raw = read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Designs in document order, each validated to be a list of two or
    /// more subset names.
    pub fn designs(&self) -> ConfigResult<Vec<(String, Vec<String>)>> {
        let mut designs = Vec::with_capacity(self.design.len());
        for (name, value) in &self.design {
            let items = value.as_array().ok_or_else(|| ConfigError::BadValue {
                key: format!("design.{}", name),
                reason: "design must be a list of subset names".to_string(),
            })?;

            let mut subsets = Vec::with_capacity(items.len());
            for item in items {
                let subset = item.as_str().ok_or_else(|| ConfigError::BadValue {
                    key: format!("design.{}", name),
                    reason: "subset references must be strings".to_string(),
                })?;
                subsets.push(subset.to_string());
            }

            if subsets.len() < 2 {
                return Err(ConfigError::ShortDesign(name.clone()));
            }
            designs.push((name.clone(), subsets));
        }
        Ok(designs)
    }
}
