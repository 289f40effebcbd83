use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fxhash::FxHashSet as HashSet;
use indicatif::{ProgressBar, ProgressStyle};

use scmetab_core::errors::{DataError, DataResult};
use scmetab_core::models::{CellMetadata, ComparisonJob, Group, Subset};
use scmetab_io::gmt::GeneSetCollection;
use scmetab_io::group_file::PartitionRow;
use scmetab_io::matrix::ExprMatrix;

use crate::config::{PipelineConfig, RuleMode, RuleSpec};
use crate::design::expand_designs;
use crate::errors::{ConfigError, ConfigResult};
use crate::output::{
    RunReport, SkippedReport, SubsetReport, write_activity, write_design_enrichment,
    write_enrichment, write_heterogeneity, write_report,
};
use crate::resolver::{
    Partitioner, build_rules, resolve_groups, resolve_subsets, validate_partitioner,
};
use crate::scoring::{
    ActivityMatrix, EnrichmentTester, GroupMatrix, PathwayScorer, PathwayTest,
    pathway_cell_scores, pathway_heterogeneity,
};

pub const REPORT_FILE: &str = "report.json";

/// Runtime inputs that are not part of the TOML document: where to write,
/// and the external partition files for the `Input` modes.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub out_dir: PathBuf,
    pub subset_rows: Option<Vec<PartitionRow>>,
    pub group_rows: Option<Vec<PartitionRow>>,
}

/// A job that was skipped because of a data problem; siblings kept running.
#[derive(Debug)]
pub struct SkippedJob {
    pub job: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct RunSummary {
    pub outputs: Vec<PathBuf>,
    pub skipped: Vec<SkippedJob>,
    pub gene_sets_used: usize,
    pub gene_sets_dropped: usize,
}

/// Build the partitioner for one dimension out of the config and the
/// optional external partition rows.
pub fn build_partitioner<'a>(
    spec: &'a RuleSpec,
    key: &str,
    column: Option<&'a str>,
    rows: Option<&'a [PartitionRow]>,
) -> ConfigResult<Partitioner<'a>> {
    match spec {
        RuleSpec::Mode(RuleMode::Input) => rows
            .map(Partitioner::Input)
            .ok_or_else(|| ConfigError::InputFileUnset(key.to_string())),
        RuleSpec::Mode(RuleMode::Idents) => column
            .map(Partitioner::Idents)
            .ok_or_else(|| ConfigError::IdentColumnUnset(key.to_string())),
        RuleSpec::Rules(_) => {
            let pairs = spec.rules(key)?.unwrap_or_default();
            Ok(Partitioner::Rules(build_rules(&pairs)?))
        }
    }
}

struct SubsetOutput {
    groups: Vec<Group>,
    activity: ActivityMatrix,
    heterogeneity: GroupMatrix,
    enrichment: Vec<(String, Vec<PathwayTest>)>,
}

fn score_subset(
    meta: &CellMetadata,
    expr: &ExprMatrix,
    gene_sets: &GeneSetCollection,
    subset: &Subset,
    grouping: &Partitioner,
    grouping_prefix: Option<&str>,
    scorer: &dyn PathwayScorer,
    tester: &dyn EnrichmentTester,
) -> DataResult<SubsetOutput> {
    let groups = resolve_groups(meta, subset, grouping, grouping_prefix)?;

    let activity = scorer.score(expr, &groups, gene_sets)?;
    let heterogeneity = pathway_heterogeneity(expr, &groups, gene_sets)?;

    let mut enrichment: Vec<(String, Vec<PathwayTest>)> = Vec::new();
    if groups.len() >= 2 {
        for (g, group) in groups.iter().enumerate() {
            let rest: Vec<String> = groups
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != g)
                .flat_map(|(_, other)| other.cells.iter().cloned())
                .collect();

            let scores_in = pathway_cell_scores(expr, gene_sets, &group.cells)?;
            let scores_rest = pathway_cell_scores(expr, gene_sets, &rest)?;
            let tests = tester.test(&scores_in, &scores_rest)?;
            enrichment.push((group.name.clone(), tests));
        }
    }

    Ok(SubsetOutput {
        groups,
        activity,
        heterogeneity,
        enrichment,
    })
}

fn run_design(
    expr: &ExprMatrix,
    gene_sets: &GeneSetCollection,
    job: &ComparisonJob,
    tester: &dyn EnrichmentTester,
) -> DataResult<Vec<(String, Vec<PathwayTest>)>> {
    for arm in &job.arms {
        if arm.cells.is_empty() {
            return Err(DataError::EmptySubset(arm.subset.clone()));
        }
    }

    let baseline = &job.arms[0];
    let baseline_scores = pathway_cell_scores(expr, gene_sets, &baseline.cells)?;

    let mut results: Vec<(String, Vec<PathwayTest>)> = Vec::new();
    for arm in &job.arms[1..] {
        let arm_scores = pathway_cell_scores(expr, gene_sets, &arm.cells)?;
        let tests = tester.test(&baseline_scores, &arm_scores)?;
        results.push((format!("{}_vs_{}", baseline.subset, arm.subset), tests));
    }
    Ok(results)
}

/// Execute the whole pipeline.
///
/// Configuration problems abort before any scoring starts; data problems
/// in one subset or design are recorded as skipped jobs and the siblings
/// keep running. Output order follows configuration order, so reruns over
/// unchanged inputs produce identical files.
#[allow(clippy::too_many_arguments)]
pub fn run_pipeline(
    config: &PipelineConfig,
    meta: &CellMetadata,
    expr: &ExprMatrix,
    gene_sets: &GeneSetCollection,
    scorer: &dyn PathwayScorer,
    tester: &dyn EnrichmentTester,
    opts: &RunOptions,
) -> Result<RunSummary> {
    let subsetting = build_partitioner(
        &config.subsetting,
        "subsetting",
        config.subsetting_column.as_deref(),
        opts.subset_rows.as_deref(),
    )?;
    let grouping = build_partitioner(
        &config.grouping,
        "grouping",
        config.grouping_column.as_deref(),
        opts.group_rows.as_deref(),
    )?;

    // fail fast: every configuration problem surfaces before computation
    validate_partitioner(meta, &subsetting)?;
    validate_partitioner(meta, &grouping)?;
    let designs = config.designs()?;

    let resolution = resolve_subsets(meta, &subsetting, config.subsetting_prefix.as_deref())?;
    let jobs = expand_designs(&designs, &resolution)?;

    let universe: HashSet<&str> = expr.genes().iter().map(|g| g.as_str()).collect();
    let (gene_sets, gene_sets_dropped) = gene_sets
        .filter_to_universe(&universe, config.scoring.min_genes)
        .context("filtering gene sets against the expression matrix")?;

    std::fs::create_dir_all(&opts.out_dir)
        .with_context(|| format!("creating output directory {:?}", opts.out_dir))?;

    let mut outputs: Vec<PathBuf> = Vec::new();
    let mut skipped: Vec<SkippedJob> = resolution
        .skipped
        .iter()
        .map(|s| SkippedJob {
            job: format!("subset:{}", s.name),
            reason: s.error.to_string(),
        })
        .collect();
    let mut subset_reports: Vec<SubsetReport> = Vec::new();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed}] {msg}")
            .unwrap()
            .tick_strings(&["-", "\\", "|", "/"]),
    );

    for subset in &resolution.subsets {
        spinner.set_message(format!("Scoring subset {}", subset.name));
        spinner.tick();

        let output = match score_subset(
            meta,
            expr,
            &gene_sets,
            subset,
            &grouping,
            config.grouping_prefix.as_deref(),
            scorer,
            tester,
        ) {
            Ok(output) => output,
            Err(error) => {
                skipped.push(SkippedJob {
                    job: format!("subset:{}", subset.name),
                    reason: error.to_string(),
                });
                continue;
            }
        };

        let activity_path = opts
            .out_dir
            .join(format!("{}.pathway_activity.tsv", subset.name));
        write_activity(&activity_path, &config.grouping_name, &output.activity)?;
        outputs.push(activity_path);

        let heterogeneity_path = opts
            .out_dir
            .join(format!("{}.pathway_heterogeneity.tsv", subset.name));
        write_heterogeneity(
            &heterogeneity_path,
            &config.grouping_name,
            &output.heterogeneity,
        )?;
        outputs.push(heterogeneity_path);

        if output.enrichment.is_empty() {
            skipped.push(SkippedJob {
                job: format!("enrichment:{}", subset.name),
                reason: "needs at least two groups".to_string(),
            });
        } else {
            let enrichment_path = opts.out_dir.join(format!("{}.enrichment.tsv", subset.name));
            write_enrichment(&enrichment_path, &config.grouping_name, &output.enrichment)?;
            outputs.push(enrichment_path);
        }

        subset_reports.push(SubsetReport {
            name: subset.name.clone(),
            n_cells: subset.len(),
            n_groups: output.groups.len(),
        });
    }

    for job in &jobs {
        spinner.set_message(format!("Testing design {}", job.design));
        spinner.tick();

        match run_design(expr, &gene_sets, job, tester) {
            Ok(results) => {
                let path = opts
                    .out_dir
                    .join(format!("{}.design_enrichment.tsv", job.design));
                write_design_enrichment(&path, &results)?;
                outputs.push(path);
            }
            Err(error) => skipped.push(SkippedJob {
                job: format!("design:{}", job.design),
                reason: error.to_string(),
            }),
        }
    }

    spinner.finish_and_clear();

    let report = RunReport {
        grouping_name: config.grouping_name.clone(),
        subsets: subset_reports,
        designs: jobs.iter().map(|j| j.design.clone()).collect(),
        gene_sets_used: gene_sets.len(),
        gene_sets_dropped,
        outputs: outputs
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect(),
        skipped: skipped
            .iter()
            .map(|s| SkippedReport {
                job: s.job.clone(),
                reason: s.reason.clone(),
            })
            .collect(),
    };
    write_report(&opts.out_dir.join(REPORT_FILE), &report)?;

    Ok(RunSummary {
        outputs,
        skipped,
        gene_sets_used: gene_sets.len(),
        gene_sets_dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::path::PathBuf;

    use scmetab_io::metadata::read_cell_metadata;
    use crate::scoring::{MeanRatioScorer, WelchTester};

    fn fixtures() -> (PipelineConfig, CellMetadata, ExprMatrix, GeneSetCollection) {
        let config =
            PipelineConfig::from_file(Path::new("../tests/data/config.toml")).unwrap();
        let meta = read_cell_metadata(Path::new("../tests/data/metadata.tsv")).unwrap();
        let expr = ExprMatrix::from_mtx_dir(Path::new("../tests/data/matrix")).unwrap();
        let gene_sets =
            GeneSetCollection::from_file(Path::new("../tests/data/pathways.gmt")).unwrap();
        (config, meta, expr, gene_sets)
    }

    fn run_with(config: &PipelineConfig, out_dir: PathBuf) -> RunSummary {
        let (_, meta, expr, gene_sets) = fixtures();
        let scorer = MeanRatioScorer {
            n_perm: config.scoring.n_perm,
            seed: config.scoring.seed,
        };
        let opts = RunOptions {
            out_dir,
            subset_rows: None,
            group_rows: None,
        };
        run_pipeline(config, &meta, &expr, &gene_sets, &scorer, &WelchTester, &opts).unwrap()
    }

    #[rstest]
    fn test_run_writes_all_result_categories() {
        let (config, ..) = fixtures();
        let dir = tempfile::tempdir().unwrap();

        let summary = run_with(&config, dir.path().to_path_buf());

        let names: Vec<String> = summary
            .outputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"pre.pathway_activity.tsv".to_string()));
        assert!(names.contains(&"pre.pathway_heterogeneity.tsv".to_string()));
        assert!(names.contains(&"pre.enrichment.tsv".to_string()));
        assert!(names.contains(&"post.pathway_activity.tsv".to_string()));
        assert!(names.contains(&"post_vs_pre.design_enrichment.tsv".to_string()));
        assert!(dir.path().join(REPORT_FILE).is_file());

        // FAO has no genes in the matrix universe
        assert_eq!(summary.gene_sets_used, 2);
        assert_eq!(summary.gene_sets_dropped, 1);
        assert!(summary.skipped.is_empty());

        let activity = std::fs::read_to_string(dir.path().join("pre.pathway_activity.tsv")).unwrap();
        let mut lines = activity.lines();
        assert_eq!(lines.next().unwrap(), "pathway\tGroup\tactivity\tp_value");
        // two pathways x two clusters in the pre subset
        assert_eq!(lines.count(), 4);
    }

    #[rstest]
    fn test_empty_subset_skips_but_run_continues() {
        let (_, meta, expr, gene_sets) = fixtures();
        let config: PipelineConfig = toml::from_str(
            r#"
            grouping = "Idents"
            grouping_column = "cluster"

            [subsetting]
            nobody = "treatment == 'during'"
            everyone = "TRUE"

            [scoring]
            min_genes = 2
            "#,
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let scorer = MeanRatioScorer { n_perm: 10, seed: 1 };
        let opts = RunOptions {
            out_dir: dir.path().to_path_buf(),
            subset_rows: None,
            group_rows: None,
        };
        let summary =
            run_pipeline(&config, &meta, &expr, &gene_sets, &scorer, &WelchTester, &opts).unwrap();

        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].job, "subset:nobody");
        assert!(
            dir.path()
                .join("everyone.pathway_activity.tsv")
                .is_file()
        );
    }

    #[rstest]
    fn test_unknown_design_reference_aborts() {
        let (_, meta, expr, gene_sets) = fixtures();
        let config: PipelineConfig = toml::from_str(
            r#"
            grouping = "Idents"
            grouping_column = "cluster"

            [subsetting]
            pre = "treatment == 'pre'"
            post = "treatment == 'post'"

            [design]
            bad = ["post", "never_configured"]
            "#,
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let scorer = MeanRatioScorer { n_perm: 10, seed: 1 };
        let opts = RunOptions {
            out_dir: dir.path().to_path_buf(),
            subset_rows: None,
            group_rows: None,
        };
        let result =
            run_pipeline(&config, &meta, &expr, &gene_sets, &scorer, &WelchTester, &opts);

        assert!(result.is_err());
        // fail fast: nothing was written
        assert!(!dir.path().join(REPORT_FILE).exists());
    }
}
