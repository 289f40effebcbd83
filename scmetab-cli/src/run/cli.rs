use clap::{Command, arg};

pub const RUN_CMD: &str = "run";

pub fn create_run_cli() -> Command {
    Command::new(RUN_CMD)
        .about("Score pathway activity and run differential enrichment over configured subsets.")
        .arg(arg!(--config <config> "Pipeline configuration TOML").required(true))
        .arg(arg!(--gmt <gmt> "Gene set collection in GMT format").required(true))
        .arg(arg!(--output <output> "Output directory").required(true))
        .arg(arg!(--samples <samples> "Sample sheet with Sample and DataDir columns"))
        .arg(arg!(--metadata <metadata> "Merged per-cell metadata table"))
        .arg(arg!(--matrix <matrix> "Matrix Market expression directory"))
        .arg(arg!(--"subset-file" <file> "External partition file for subsetting = \"Input\""))
        .arg(arg!(--"group-file" <file> "External partition file for grouping = \"Input\""))
}
