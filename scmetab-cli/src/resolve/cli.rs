use clap::{Command, arg};

pub const RESOLVE_CMD: &str = "resolve";

pub fn create_resolve_cli() -> Command {
    Command::new(RESOLVE_CMD)
        .about("Print the resolved subset and group partition without running any scoring.")
        .arg(arg!(--config <config> "Pipeline configuration TOML").required(true))
        .arg(arg!(--samples <samples> "Sample sheet with Sample and DataDir columns"))
        .arg(arg!(--metadata <metadata> "Merged per-cell metadata table"))
        .arg(arg!(--"subset-file" <file> "External partition file for subsetting = \"Input\""))
        .arg(arg!(--"group-file" <file> "External partition file for grouping = \"Input\""))
}
