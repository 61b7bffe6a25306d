use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod ui;

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    // Failed operations have already been reported in the selected output
    // format; only the exit code is left to set.
    if !parsed.dispatch().await? {
        std::process::exit(1);
    }
    Ok(())
}
