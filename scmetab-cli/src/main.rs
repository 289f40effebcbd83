mod resolve;
mod run;

use anyhow::Result;
use clap::Command;

pub mod consts {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const BIN_NAME: &str = "scmetab";
}

fn build_parser() -> Command {
    Command::new(consts::BIN_NAME)
        .bin_name(consts::BIN_NAME)
        .version(consts::VERSION)
        .about("Configuration-driven metabolic landscape analysis for single-cell RNA-seq data.")
        .subcommand_required(true)
        .subcommand(run::cli::create_run_cli())
        .subcommand(resolve::cli::create_resolve_cli())
}

fn main() -> Result<()> {
    let app = build_parser();
    let matches = app.get_matches();

    match matches.subcommand() {
        //
        // RUN
        //
        Some((run::cli::RUN_CMD, matches)) => {
            run::handlers::run_run(matches)?;
        }

        //
        // RESOLVE
        //
        Some((resolve::cli::RESOLVE_CMD, matches)) => {
            resolve::handlers::run_resolve(matches)?;
        }

        _ => unreachable!("Subcommand not found"),
    };

    Ok(())
}
