//! rastermeta CLI entrypoint.
//!
//! Provides a thin wrapper over the `cli` module: parse args, run the crawl,
//! and exit with appropriate status. Individual files that fail to parse are
//! listed but do not change the exit status.
//! For programmatic use, prefer the library API (`rastermeta::api`).

use clap::Parser;

mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::CliArgs::parse();
    cli::run(args)
}
