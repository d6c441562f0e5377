//! SeedHub CLI: reconcile seed manifests across module repositories.
//!
//! Builds the hub's registry index, writes it as an artifact, patches the
//! hub README, and merges or harvests shared seed files.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);

    if let Err(e) = commands::run(cli).await {
        eprintln!("[seedhub] FATAL: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
