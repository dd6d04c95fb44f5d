use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub server: String,
    pub application: String,
    /// Program text sent along with every query, if any.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub queries: Vec<String>,
    pub iconify_previous: bool,
    pub max_answers: usize,
    #[serde(default)]
    pub chunk: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub user_agent: String,
}

/// Identifies a runner for the lifetime of a collection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunnerId(pub u64);

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A goal to prove, optionally against a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub goal: String,
    #[serde(default)]
    pub source: Option<String>,
    /// Collapse the previous runner when it is no longer alive.
    pub iconify_previous: bool,
}

impl Query {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            source: None,
            iconify_previous: true,
        }
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_iconify_previous(mut self, on: bool) -> Self {
        self.iconify_previous = on;
        self
    }
}

/// Lifecycle of a runner's query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunnerState {
    /// Job not yet created
    Idle,
    /// Job is computing
    Running,
    /// Produced a non-deterministic answer
    WaitNext,
    /// Waits for input
    WaitInput,
    /// Produced the last answer
    True,
    /// Failed
    False,
    /// Raised an error
    Error,
    /// User selected stop after a non-deterministic answer
    Stopped,
    /// Execution was aborted
    Aborted,
}

impl RunnerState {
    pub fn is_alive(self) -> bool {
        matches!(
            self,
            RunnerState::Running | RunnerState::WaitNext | RunnerState::WaitInput
        )
    }

    pub fn is_terminal(self) -> bool {
        !self.is_alive() && self != RunnerState::Idle
    }

    pub fn label(self) -> &'static str {
        match self {
            RunnerState::Idle => "idle",
            RunnerState::Running => "running",
            RunnerState::WaitNext => "wait-next",
            RunnerState::WaitInput => "wait-input",
            RunnerState::True => "true",
            RunnerState::False => "false",
            RunnerState::Error => "error",
            RunnerState::Stopped => "stopped",
            RunnerState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a compiler-style message points into the program source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default, rename = "ch")]
    pub character: Option<u32>,
}

/// One solution: variable bindings rendered as text, in projection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub bindings: Vec<(String, String)>,
}

impl Answer {
    pub fn to_text(&self) -> String {
        if self.bindings.is_empty() {
            return "true".into();
        }
        self.bindings
            .iter()
            .map(|(name, value)| format!("{name} = {value}"))
            .collect::<Vec<_>>()
            .join(",\n")
    }
}

/// Callbacks delivered by a job, in per-job FIFO order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    Created { id: String },
    Success { answers: Vec<Answer>, more: bool },
    Failure,
    Stop,
    Prompt(Option<String>),
    Output {
        text: String,
        location: Option<SourceLocation>,
    },
    Error {
        code: Option<String>,
        message: String,
    },
    Abort,
}

impl JobEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Created { .. } => "create",
            JobEvent::Success { .. } => "success",
            JobEvent::Failure => "failure",
            JobEvent::Stop => "stop",
            JobEvent::Prompt(_) => "prompt",
            JobEvent::Output { .. } => "output",
            JobEvent::Error { .. } => "error",
            JobEvent::Abort => "aborted",
        }
    }
}

/// Notifications for collaborators outside the runner collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostEvent {
    /// Located diagnostic for the source editor.
    SourceError {
        text: String,
        location: SourceLocation,
    },
    /// Show a documentation topic.
    Help { topic: String },
}

impl HostEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            HostEvent::SourceError { text, location } => match location.line {
                Some(line) => format!("{}:{}: {}", location.file, line, text.trim()),
                None => format!("{}: {}", location.file, text.trim()),
            },
            HostEvent::Help { topic } => format!("Help: {topic}"),
        }
    }
}
