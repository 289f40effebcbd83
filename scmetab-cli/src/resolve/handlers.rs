use std::path::Path;

use anyhow::{Result, bail};
use clap::ArgMatches;

use scmetab_core::models::CellMetadata;
use scmetab_io::metadata::read_cell_metadata;
use scmetab_io::sample_sheet::{SampleSheet, load_samples};
use scmetab_pipeline::config::PipelineConfig;
use scmetab_pipeline::resolver::{resolve_groups, resolve_subsets, validate_partitioner};
use scmetab_pipeline::runner::build_partitioner;

use crate::run::handlers::read_rows;

pub fn run_resolve(matches: &ArgMatches) -> Result<()> {
    let config_path = matches
        .get_one::<String>("config")
        .expect("A pipeline configuration is required.");

    let config = PipelineConfig::from_file(Path::new(config_path))?;
    let meta = load_metadata(matches)?;

    let subset_rows = read_rows(matches, "subset-file")?;
    let group_rows = read_rows(matches, "group-file")?;

    let subsetting = build_partitioner(
        &config.subsetting,
        "subsetting",
        config.subsetting_column.as_deref(),
        subset_rows.as_deref(),
    )?;
    let grouping = build_partitioner(
        &config.grouping,
        "grouping",
        config.grouping_column.as_deref(),
        group_rows.as_deref(),
    )?;
    validate_partitioner(&meta, &subsetting)?;
    validate_partitioner(&meta, &grouping)?;

    let resolution = resolve_subsets(&meta, &subsetting, config.subsetting_prefix.as_deref())?;

    println!("kind\tname\tcell");
    for subset in &resolution.subsets {
        for cell in &subset.cells {
            println!("subset\t{}\t{}", subset.name, cell);
        }
        match resolve_groups(&meta, subset, &grouping, config.grouping_prefix.as_deref()) {
            Ok(groups) => {
                for group in groups {
                    for cell in &group.cells {
                        println!("group\t{}/{}\t{}", subset.name, group.name, cell);
                    }
                }
            }
            Err(error) => eprintln!("skipped groups for {}: {}", subset.name, error),
        }
    }
    for skip in &resolution.skipped {
        eprintln!("skipped subset {}: {}", skip.name, skip.error);
    }

    Ok(())
}

fn load_metadata(matches: &ArgMatches) -> Result<CellMetadata> {
    if let Some(sheet_path) = matches.get_one::<String>("samples") {
        let sheet = SampleSheet::from_file(Path::new(sheet_path))?;
        let (meta, _) = load_samples(&sheet)?;
        return Ok(meta);
    }
    if let Some(metadata) = matches.get_one::<String>("metadata") {
        return Ok(read_cell_metadata(Path::new(metadata))?);
    }
    bail!("Provide either --samples or --metadata");
}
