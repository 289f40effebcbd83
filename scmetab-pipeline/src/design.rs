use scmetab_core::models::{ComparisonArm, ComparisonJob};

use crate::errors::{ConfigError, ConfigResult};
use crate::resolver::Resolution;

/// Expand the design map into comparison jobs.
///
/// Every referenced subset name is validated against the resolved partition
/// names before any job is emitted, so a bad reference aborts the run before
/// computation starts. A reference to a partition that was configured but
/// skipped (e.g. it resolved empty) is not a configuration error: the job is
/// emitted with an empty arm and the runner skips it as a data problem.
/// Jobs come out in design document order.
pub fn expand_designs(
    designs: &[(String, Vec<String>)],
    resolution: &Resolution,
) -> ConfigResult<Vec<ComparisonJob>> {
    let known = resolution.known_names();

    for (design, subsets) in designs {
        if subsets.len() < 2 {
            return Err(ConfigError::ShortDesign(design.clone()));
        }
        for subset in subsets {
            if !known.contains(&subset.as_str()) {
                return Err(ConfigError::UnknownSubset {
                    design: design.clone(),
                    subset: subset.clone(),
                });
            }
        }
    }

    let jobs = designs
        .iter()
        .map(|(design, subsets)| {
            let arms = subsets
                .iter()
                .map(|name| ComparisonArm {
                    subset: name.clone(),
                    cells: resolution
                        .subset(name)
                        .map(|s| s.cells.clone())
                        .unwrap_or_default(),
                })
                .collect();
            ComparisonJob::new(design.clone(), arms)
        })
        .collect();

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use scmetab_core::errors::DataError;
    use scmetab_core::models::Subset;
    use crate::resolver::SkippedPartition;

    fn resolution() -> Resolution {
        Resolution {
            subsets: vec![
                Subset::new("pre", vec!["c1".to_string(), "c2".to_string()]),
                Subset::new("post", vec!["c3".to_string()]),
            ],
            skipped: vec![SkippedPartition {
                name: "empty".to_string(),
                error: DataError::EmptySubset("empty".to_string()),
            }],
        }
    }

    #[rstest]
    fn test_expand_emits_jobs_in_order() {
        let designs = vec![
            (
                "p_vs_q".to_string(),
                vec!["post".to_string(), "pre".to_string()],
            ),
            (
                "q_vs_p".to_string(),
                vec!["pre".to_string(), "post".to_string()],
            ),
        ];

        let jobs = expand_designs(&designs, &resolution()).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].design, "p_vs_q");
        assert_eq!(jobs[0].arms[0].subset, "post");
        assert_eq!(jobs[0].arms[0].cells, vec!["c3"]);
        assert_eq!(jobs[0].arms[1].cells, vec!["c1", "c2"]);
    }

    #[rstest]
    fn test_unknown_subset_is_config_error() {
        let designs = vec![(
            "bad".to_string(),
            vec!["post".to_string(), "nope".to_string()],
        )];

        let result = expand_designs(&designs, &resolution());
        assert!(matches!(
            result,
            Err(ConfigError::UnknownSubset { design, subset })
                if design == "bad" && subset == "nope"
        ));
    }

    #[rstest]
    fn test_skipped_subset_reference_is_not_config_error() {
        let designs = vec![(
            "half".to_string(),
            vec!["empty".to_string(), "pre".to_string()],
        )];

        let jobs = expand_designs(&designs, &resolution()).unwrap();
        assert!(jobs[0].arms[0].cells.is_empty());
    }
}
