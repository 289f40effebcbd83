use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::ArgMatches;

use scmetab_core::models::CellMetadata;
use scmetab_io::gmt::GeneSetCollection;
use scmetab_io::group_file::{PartitionRow, read_partition_file};
use scmetab_io::matrix::ExprMatrix;
use scmetab_io::metadata::read_cell_metadata;
use scmetab_io::sample_sheet::{SampleSheet, load_samples};
use scmetab_pipeline::config::PipelineConfig;
use scmetab_pipeline::runner::{RunOptions, run_pipeline};
use scmetab_pipeline::scoring::{MeanRatioScorer, WelchTester};

pub fn run_run(matches: &ArgMatches) -> Result<()> {
    let config_path = matches
        .get_one::<String>("config")
        .expect("A pipeline configuration is required.");
    let gmt_path = matches
        .get_one::<String>("gmt")
        .expect("A gene set collection is required.");
    let output = matches
        .get_one::<String>("output")
        .expect("An output directory is required.");

    let config = PipelineConfig::from_file(Path::new(config_path))?;
    let (meta, expr) = load_inputs(matches)?;
    let gene_sets = GeneSetCollection::from_file(Path::new(gmt_path))?;

    let scorer = MeanRatioScorer {
        n_perm: config.scoring.n_perm,
        seed: config.scoring.seed,
    };
    let opts = RunOptions {
        out_dir: PathBuf::from(output),
        subset_rows: read_rows(matches, "subset-file")?,
        group_rows: read_rows(matches, "group-file")?,
    };

    let summary = run_pipeline(&config, &meta, &expr, &gene_sets, &scorer, &WelchTester, &opts)?;

    println!("Wrote {} result files to {}", summary.outputs.len(), output);
    if summary.gene_sets_dropped > 0 {
        println!(
            "Used {} gene sets, dropped {} with too few genes in the matrix",
            summary.gene_sets_used, summary.gene_sets_dropped
        );
    }
    for skip in &summary.skipped {
        eprintln!("skipped {}: {}", skip.job, skip.reason);
    }

    Ok(())
}

pub fn load_inputs(matches: &ArgMatches) -> Result<(CellMetadata, ExprMatrix)> {
    if let Some(sheet_path) = matches.get_one::<String>("samples") {
        let sheet = SampleSheet::from_file(Path::new(sheet_path))?;
        let loaded = load_samples(&sheet)?;
        return Ok(loaded);
    }

    let (Some(metadata), Some(matrix)) = (
        matches.get_one::<String>("metadata"),
        matches.get_one::<String>("matrix"),
    ) else {
        bail!("Provide either --samples or both --metadata and --matrix");
    };

    let meta = read_cell_metadata(Path::new(metadata))?;
    let expr = ExprMatrix::from_mtx_dir(Path::new(matrix))?;
    Ok((meta, expr))
}

pub fn read_rows(matches: &ArgMatches, arg: &str) -> Result<Option<Vec<PartitionRow>>> {
    match matches.get_one::<String>(arg) {
        Some(path) => Ok(Some(read_partition_file(Path::new(path))?)),
        None => Ok(None),
    }
}
