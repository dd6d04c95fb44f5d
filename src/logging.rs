//! Tracing subscriber setup.
//!
//! The TUI owns the terminal, so it logs to a file (or nowhere). Text mode
//! logs to stderr. `RUST_LOG` overrides the default filter.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "pengine_runners=info";

pub enum Sink<'a> {
    Stderr,
    File(&'a Path),
    Discard,
}

pub fn init(sink: Sink<'_>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match sink {
        Sink::Stderr => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
        Sink::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file: {}", path.display()))?;
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Sink::Discard => {
            let _ = builder.with_writer(std::io::sink).try_init();
        }
    }
    Ok(())
}
