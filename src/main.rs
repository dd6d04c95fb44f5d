mod cli;
mod config;
mod engine;
mod hover;
mod logging;
mod model;
mod orchestrator;
mod runner;
mod term;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_text = args.text;

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 in text mode
            if is_text {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}
