use crate::config::{self, FileConfig};
use crate::engine::pengine::PengineClient;
use crate::model::{Query, RunConfig, RunnerState};
use crate::orchestrator::{Controller, UiCommand};
use crate::runner::{submit_input, RunnerAction};
use crate::text_summary::TextSummary;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_SERVER: &str = "http://localhost:3050";
const DEFAULT_APPLICATION: &str = "swish";
const DEFAULT_MAX_ANSWERS: usize = 10;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                    let _ = err.flush();
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "pengine-runners",
    version,
    about = "Run Prolog queries against a Pengines server, one runner per query"
)]
pub struct Cli {
    /// Base URL of the Pengines server
    #[arg(long)]
    pub server: Option<String>,

    /// Pengine application to run queries in
    #[arg(long)]
    pub application: Option<String>,

    /// Prolog program file sent along with every query
    #[arg(long)]
    pub src: Option<PathBuf>,

    /// Query to run on launch; may be given more than once
    #[arg(long = "query", short = 'q')]
    pub queries: Vec<String>,

    /// Print answers as text and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Answers to request per query in text mode before stopping
    #[arg(long)]
    pub max_answers: Option<usize>,

    /// Answers the server computes per request
    #[arg(long)]
    pub chunk: Option<u32>,

    /// Use --iconify-previous true or --iconify-previous false to override
    #[arg(long, action = clap::ArgAction::Set)]
    pub iconify_previous: Option<bool>,

    /// HTTP request timeout
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write logs to this file in TUI mode
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

pub async fn run(args: Cli) -> Result<()> {
    let file = config::load(args.config.as_deref())?;
    let cfg = build_config(&args, &file)?;

    if !args.text {
        #[cfg(feature = "tui")]
        {
            let log_file = args.log_file.clone().or(file.log_file);
            match log_file.as_deref() {
                Some(path) => crate::logging::init(crate::logging::Sink::File(path))?,
                None => crate::logging::init(crate::logging::Sink::Discard)?,
            }
            return crate::tui::run(cfg).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            crate::logging::init(crate::logging::Sink::Stderr)?;
            return run_text(cfg).await;
        }
    }

    crate::logging::init(crate::logging::Sink::Stderr)?;
    run_text(cfg).await
}

/// Resolve the effective configuration: flags, then the config file, then
/// defaults.
pub fn build_config(args: &Cli, file: &FileConfig) -> Result<RunConfig> {
    let source = match args.src.as_ref().or(file.src.as_ref()) {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read program: {}", path.display()))?,
        ),
        None => None,
    };
    Ok(RunConfig {
        server: args
            .server
            .clone()
            .or_else(|| file.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
        application: args
            .application
            .clone()
            .or_else(|| file.application.clone())
            .unwrap_or_else(|| DEFAULT_APPLICATION.to_string()),
        source,
        queries: args.queries.clone(),
        iconify_previous: args
            .iconify_previous
            .or(file.iconify_previous)
            .unwrap_or(true),
        max_answers: args
            .max_answers
            .or(file.max_answers)
            .unwrap_or(DEFAULT_MAX_ANSWERS)
            .max(1),
        chunk: args.chunk.or(file.chunk),
        timeout: args
            .timeout
            .map(Duration::from)
            .or(file.timeout)
            .unwrap_or(DEFAULT_TIMEOUT),
        user_agent: format!("pengine-runners/{}", env!("CARGO_PKG_VERSION")),
    })
}

pub fn make_query(cfg: &RunConfig, goal: &str) -> Query {
    Query::new(goal)
        .with_source(cfg.source.clone())
        .with_iconify_previous(cfg.iconify_previous)
}

/// Run every query in turn without a terminal UI, printing answers as they
/// arrive.
async fn run_text(cfg: RunConfig) -> Result<()> {
    if cfg.queries.is_empty() {
        return Err(anyhow::anyhow!("text mode needs at least one --query"));
    }
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel();
    let client = PengineClient::new(&cfg, tokio::runtime::Handle::current(), evt_tx)
        .context("failed to create HTTP client")?;
    let mut controller = Controller::new(client, evt_rx, 0);
    let mut summary = TextSummary::new();
    let mut failed = 0usize;

    for goal in &cfg.queries {
        if goal.trim().is_empty() {
            continue;
        }
        controller.handle(UiCommand::Run(make_query(&cfg, goal)));
        let Some(id) = controller.collection().members().last().map(|m| m.runner.id()) else {
            continue;
        };

        loop {
            for host in controller.host_events() {
                let _ = out_tx.send(OutputLine::Stderr(host.to_message()));
            }
            for line in summary.new_lines(controller.collection()) {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }

            let Some(member) = controller.collection().get(id) else {
                break;
            };
            let runner = &member.runner;
            match runner.state() {
                RunnerState::WaitNext => {
                    let action = if (runner.answer_count() as usize) < cfg.max_answers {
                        RunnerAction::Next
                    } else {
                        RunnerAction::Stop
                    };
                    controller.handle(UiCommand::Runner(id, action));
                }
                RunnerState::WaitInput => {
                    let prompt = runner.prompt().unwrap_or_default().to_string();
                    let _ = out_tx.send(OutputLine::Stderr(format!("{prompt}: ")));
                    let line = tokio::task::spawn_blocking(read_stdin_line)
                        .await
                        .context("stdin reader failed")??;
                    let action = match line.as_deref().and_then(submit_input) {
                        Some(text) => RunnerAction::Respond(text),
                        None => RunnerAction::Abort,
                    };
                    controller.handle(UiCommand::Runner(id, action));
                }
                state if state.is_terminal() => {
                    if state == RunnerState::Error {
                        failed += 1;
                    }
                    break;
                }
                _ => {}
            }

            match controller.next_event().await {
                Some((rid, event)) => {
                    controller.apply(rid, event);
                }
                None => break,
            }
        }
    }

    controller.handle(UiCommand::Quit);
    controller.client().shutdown(SHUTDOWN_GRACE).await;
    drop(out_tx);
    let _ = out_handle.await;

    if failed > 0 {
        return Err(anyhow::anyhow!("{failed} of {} queries raised an error", cfg.queries.len()));
    }
    Ok(())
}

/// One line from stdin; `None` at end of input.
fn read_stdin_line() -> Result<Option<String>> {
    let mut line = String::new();
    let n = std::io::stdin()
        .read_line(&mut line)
        .context("failed to read stdin")?;
    Ok((n > 0).then_some(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["pengine-runners"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let cfg = build_config(&parse(&[]), &FileConfig::default()).unwrap();
        assert_eq!(cfg.server, DEFAULT_SERVER);
        assert_eq!(cfg.application, DEFAULT_APPLICATION);
        assert!(cfg.iconify_previous);
        assert_eq!(cfg.max_answers, DEFAULT_MAX_ANSWERS);
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
        assert!(cfg.queries.is_empty());
    }

    #[test]
    fn flags_override_file() {
        let file = FileConfig {
            server: Some("http://file".into()),
            application: Some("fromfile".into()),
            max_answers: Some(3),
            iconify_previous: Some(false),
            ..Default::default()
        };
        let args = parse(&[
            "--server",
            "http://flag",
            "--iconify-previous",
            "true",
            "-q",
            "a",
            "--query",
            "b",
            "--timeout",
            "5s",
        ]);
        let cfg = build_config(&args, &file).unwrap();
        assert_eq!(cfg.server, "http://flag");
        assert_eq!(cfg.application, "fromfile");
        assert_eq!(cfg.max_answers, 3);
        assert!(cfg.iconify_previous);
        assert_eq!(cfg.queries, vec!["a", "b"]);
        assert_eq!(cfg.timeout, Duration::from_secs(5));
    }

    #[test]
    fn program_file_is_read() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "p(1).").unwrap();
        let path = f.path().to_string_lossy().to_string();
        let cfg = build_config(&parse(&["--src", &path]), &FileConfig::default()).unwrap();
        let q = make_query(&cfg, "p(X)");
        assert_eq!(q.source.as_deref(), Some("p(1).\n"));
        assert!(q.iconify_previous);
    }

    #[test]
    fn missing_program_file_is_an_error() {
        let args = parse(&["--src", "/nonexistent/prog.pl"]);
        assert!(build_config(&args, &FileConfig::default()).is_err());
    }
}
