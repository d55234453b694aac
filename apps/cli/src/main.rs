//! answerbank CLI: scheduled interview-question scraping and answering.
//!
//! Fetches questions from configured sources, answers the new ones, and
//! merges them into a sorted JSON Lines dataset. Exits nonzero only on fatal
//! errors, so a scheduler can commit the dataset whenever it changed.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
