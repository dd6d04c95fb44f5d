//! Per-query state machine.
//!
//! `transition` is the whole lifecycle as a pure function of the current
//! state and an incoming signal (user action or job callback). `Runner`
//! wraps it with the side effects: talking to the job, appending output,
//! moving focus and destroying the job when the query is over.

pub mod collection;
pub mod keys;
pub mod viewport;

use crate::engine::{JobClient, JobHandle};
use crate::model::{Answer, HostEvent, JobEvent, Query, RunnerId, RunnerState, SourceLocation};
use regex::Regex;
use std::sync::LazyLock;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

pub type HostSender = UnboundedSender<HostEvent>;

pub const HELP_TOPIC: &str = "runner.html";
pub const DEFAULT_PROMPT: &str = "Please enter a Prolog term";
pub const ABORTED_MESSAGE: &str = "** Execution aborted **";
pub const TOO_MANY_JOBS_CODE: &str = "too_many_pengines";
pub const TOO_MANY_JOBS_MESSAGE: &str = "Too many open queries.  Please complete some\n\
queries by using |Next|, |Stop| or by\n\
closing some queries.";

static PENGINE_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pengine://[-0-9a-f]*/").expect("static pattern"));

/// Focus target of the hosting surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusTarget {
    /// The goal editor
    #[default]
    Editor,
    Runner(RunnerId),
    /// The response input of a runner waiting for input
    Input(RunnerId),
}

impl FocusTarget {
    pub fn runner(self) -> Option<RunnerId> {
        match self {
            FocusTarget::Editor => None,
            FocusTarget::Runner(id) | FocusTarget::Input(id) => Some(id),
        }
    }
}

/// User-facing operations on one runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerAction {
    Next,
    Stop,
    Abort,
    /// Abort while running or waiting for input, stop while waiting for next.
    StopOrAbort,
    /// Submit text to a prompt. Expected to be cleaned by `submit_input`.
    Respond(String),
    Close,
    ToggleIconic,
    Help,
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Run,
    Next,
    Stop,
    Abort,
    Respond,
    Created,
    Success { more: bool },
    Failure,
    Stopped,
    Prompt,
    Output,
    Error,
    Aborted,
}

impl Signal {
    pub fn of(event: &JobEvent) -> Self {
        match event {
            JobEvent::Created { .. } => Signal::Created,
            JobEvent::Success { more, .. } => Signal::Success { more: *more },
            JobEvent::Failure => Signal::Failure,
            JobEvent::Stop => Signal::Stopped,
            JobEvent::Prompt(_) => Signal::Prompt,
            JobEvent::Output { .. } => Signal::Output,
            JobEvent::Error { .. } => Signal::Error,
            JobEvent::Abort => Signal::Aborted,
        }
    }

    fn is_user(self) -> bool {
        matches!(
            self,
            Signal::Run | Signal::Next | Signal::Stop | Signal::Abort | Signal::Respond
        )
    }
}

/// Side effect that accompanies a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    CreateJob,
    RecordJobId,
    IssueNext,
    IssueStop,
    IssueAbort,
    IssueRespond,
    RenderAnswers,
    RenderFalse,
    ShowPrompt,
    RenderError,
    RenderAbort,
    AppendOutput,
    Nothing,
}

/// The lifecycle table. `None` means the signal is not valid in `state` and
/// must be ignored.
///
/// Stop and abort only issue the request; the runner enters `Stopped` or
/// `Aborted` once the job acknowledges it.
pub fn transition(state: RunnerState, signal: Signal) -> Option<(RunnerState, Effect)> {
    use RunnerState::*;

    let step = match (state, signal) {
        (Idle, Signal::Run) => (Running, Effect::CreateJob),
        (Running, Signal::Created) => (Running, Effect::RecordJobId),
        (Running, Signal::Success { more: false }) => (True, Effect::RenderAnswers),
        (Running, Signal::Success { more: true }) => (WaitNext, Effect::RenderAnswers),
        (Running, Signal::Failure) => (False, Effect::RenderFalse),
        (Running, Signal::Prompt) => (WaitInput, Effect::ShowPrompt),
        (WaitNext, Signal::Next) => (Running, Effect::IssueNext),
        (WaitNext, Signal::Stop) => (WaitNext, Effect::IssueStop),
        (WaitNext, Signal::Stopped) => (Stopped, Effect::Nothing),
        (WaitInput, Signal::Respond) => (Running, Effect::IssueRespond),
        (s, Signal::Abort) if s.is_alive() => (s, Effect::IssueAbort),
        (s, Signal::Aborted) if s.is_alive() => (Aborted, Effect::RenderAbort),
        // A failed stop or transport error can surface while waiting.
        (s, Signal::Error) if s.is_alive() => (Error, Effect::RenderError),
        (s, Signal::Output) if s.is_alive() => (s, Effect::AppendOutput),
        _ => return None,
    };
    Some(step)
}

/// What applying a signal did to the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Unchanged,
    /// Output grew, state kept.
    Updated,
    Transitioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    Odd,
    Even,
}

/// One entry of a runner's output log.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Answer { answer: Answer, parity: Parity },
    Output {
        text: String,
        location: Option<SourceLocation>,
    },
    Response(String),
    False,
    Error(String),
}

impl Fragment {
    pub fn text(&self) -> String {
        match self {
            Fragment::Answer { answer, .. } => answer.to_text(),
            Fragment::Output { text, .. } => text.clone(),
            Fragment::Response(text) => text.clone(),
            Fragment::False => "false".into(),
            Fragment::Error(msg) => msg.clone(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.text().lines().count().max(1)
    }
}

/// Borrowed pieces of the hosting surface a runner may touch.
pub struct RunnerContext<'a> {
    pub focus: &'a mut FocusTarget,
    pub host: &'a HostSender,
}

pub struct Runner {
    id: RunnerId,
    query: Query,
    state: RunnerState,
    answer_count: u64,
    job: Option<Box<dyn JobHandle>>,
    job_id: Option<String>,
    saved_focus: Option<FocusTarget>,
    prompt: Option<String>,
    pending: Option<Signal>,
    output: Vec<Fragment>,
}

impl Runner {
    /// Create an idle runner and move focus to it, remembering the previous
    /// focus target.
    pub fn new(id: RunnerId, query: Query, focus: &mut FocusTarget) -> Self {
        let saved = std::mem::replace(focus, FocusTarget::Runner(id));
        Self {
            id,
            query,
            state: RunnerState::Idle,
            answer_count: 0,
            job: None,
            job_id: None,
            saved_focus: Some(saved),
            prompt: None,
            pending: None,
            output: Vec::new(),
        }
    }

    pub fn id(&self) -> RunnerId {
        self.id
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Header shown above the runner's output, e.g. `#1 ?- member(X, L).`
    pub fn title(&self) -> String {
        format!("{} ?- {}.", self.id, term_no_full_stop(&self.query.goal))
    }

    pub fn alive(&self) -> bool {
        self.state.is_alive()
    }

    pub fn output(&self) -> &[Fragment] {
        &self.output
    }

    pub fn answer_count(&self) -> u64 {
        self.answer_count
    }

    /// Placeholder for the input control while waiting for input.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn saved_focus(&self) -> Option<FocusTarget> {
        self.saved_focus
    }

    /// Labels of the controls offered in the current state.
    pub fn controls(&self) -> &'static [&'static str] {
        match self.state {
            RunnerState::Running => &["Abort"],
            RunnerState::WaitNext => &["Next", "Stop"],
            RunnerState::WaitInput => &["Abort", "Send"],
            _ => &[],
        }
    }

    /// Rows the runner occupies when drawn.
    pub fn display_lines(&self, iconified: bool) -> usize {
        if iconified {
            return 1;
        }
        let body: usize = self.output.iter().map(Fragment::line_count).sum();
        1 + body + usize::from(self.alive())
    }

    /// Create the job and submit the goal.
    pub fn start(&mut self, client: &dyn JobClient, cx: &mut RunnerContext<'_>) -> Applied {
        let Some((next, _)) = transition(self.state, Signal::Run) else {
            debug!(runner = %self.id, state = %self.state, "runner already started");
            return Applied::Unchanged;
        };
        self.job = Some(client.create(self.id, &self.query));
        self.settle(next, cx)
    }

    pub fn perform(&mut self, action: &RunnerAction, cx: &mut RunnerContext<'_>) -> Applied {
        let signal = match action {
            RunnerAction::Next => Signal::Next,
            RunnerAction::Stop => Signal::Stop,
            RunnerAction::Abort => Signal::Abort,
            RunnerAction::StopOrAbort => match self.state {
                RunnerState::Running | RunnerState::WaitInput => Signal::Abort,
                RunnerState::WaitNext => Signal::Stop,
                _ => return Applied::Unchanged,
            },
            RunnerAction::Respond(text) if text.is_empty() => return Applied::Unchanged,
            RunnerAction::Respond(_) => Signal::Respond,
            RunnerAction::Help => {
                let _ = cx.host.send(HostEvent::Help {
                    topic: HELP_TOPIC.into(),
                });
                return Applied::Unchanged;
            }
            // Handled by the collection.
            RunnerAction::Close | RunnerAction::ToggleIconic => return Applied::Unchanged,
        };

        if self.awaiting_ack(signal) {
            trace!(runner = %self.id, ?signal, "request outstanding; action ignored");
            return Applied::Unchanged;
        }
        let Some((next, effect)) = transition(self.state, signal) else {
            debug!(runner = %self.id, state = %self.state, ?signal, "action not valid in state");
            return Applied::Unchanged;
        };

        let mut updated = false;
        if let Some(job) = self.job.as_mut() {
            match effect {
                Effect::IssueNext => job.next(),
                Effect::IssueStop => {
                    job.stop();
                    self.pending = Some(Signal::Stop);
                }
                Effect::IssueAbort => {
                    job.abort();
                    self.pending = Some(Signal::Abort);
                }
                Effect::IssueRespond => {
                    if let RunnerAction::Respond(text) = action {
                        self.output.push(Fragment::Response(text.clone()));
                        job.respond(text);
                        updated = true;
                    }
                }
                _ => {}
            }
        }

        match self.settle(next, cx) {
            Applied::Unchanged if updated => Applied::Updated,
            other => other,
        }
    }

    pub fn handle_job_event(&mut self, event: JobEvent, cx: &mut RunnerContext<'_>) -> Applied {
        let signal = Signal::of(&event);
        let Some((next, _)) = transition(self.state, signal) else {
            debug!(runner = %self.id, state = %self.state, event = event.kind(), "event ignored");
            return Applied::Unchanged;
        };

        let mut updated = true;
        match event {
            JobEvent::Created { id } => {
                trace!(runner = %self.id, pengine = %id, "job created");
                self.job_id = Some(id);
                updated = false;
            }
            JobEvent::Success { answers, .. } => {
                for answer in answers {
                    self.render_answer(answer);
                }
            }
            JobEvent::Failure => self.output.push(Fragment::False),
            JobEvent::Prompt(prompt) => {
                self.prompt = Some(prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string()));
            }
            JobEvent::Output { text, location } => self.append_output(text, location, cx),
            JobEvent::Error { code, message } => {
                let msg = normalize_error(code.as_deref(), &message, self.job_id.as_deref());
                self.output.push(Fragment::Error(msg));
            }
            JobEvent::Abort => self.output.push(Fragment::Error(ABORTED_MESSAGE.into())),
            JobEvent::Stop => updated = false,
        }

        match self.settle(next, cx) {
            Applied::Unchanged if updated => Applied::Updated,
            other => other,
        }
    }

    /// Release the job if it is still alive. Removal from the collection is
    /// up to the caller.
    pub fn close(&mut self) {
        if self.alive() {
            self.destroy_job();
        }
    }

    fn awaiting_ack(&self, signal: Signal) -> bool {
        match self.pending {
            None => false,
            Some(Signal::Abort) => signal.is_user(),
            Some(_) => signal != Signal::Abort,
        }
    }

    fn render_answer(&mut self, answer: Answer) {
        self.answer_count += 1;
        let parity = if self.answer_count % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        };
        self.output.push(Fragment::Answer { answer, parity });
    }

    fn append_output(
        &mut self,
        text: String,
        location: Option<SourceLocation>,
        cx: &mut RunnerContext<'_>,
    ) {
        match location {
            Some(location) => {
                let text = strip_pengine_uri(&text);
                let _ = cx.host.send(HostEvent::SourceError {
                    text: text.clone(),
                    location: location.clone(),
                });
                self.output.push(Fragment::Output {
                    text,
                    location: Some(location),
                });
            }
            None => self.output.push(Fragment::Output {
                text,
                location: None,
            }),
        }
    }

    /// Move to `new`. Leaving the alive states restores the saved focus and
    /// destroys the job, each at most once.
    fn settle(&mut self, new: RunnerState, cx: &mut RunnerContext<'_>) -> Applied {
        if self.state == new {
            return Applied::Unchanged;
        }
        debug!(runner = %self.id, from = %self.state, to = %new, "state change");
        let old = std::mem::replace(&mut self.state, new);
        self.pending = None;
        if new != RunnerState::WaitInput {
            self.prompt = None;
        }

        if !new.is_alive() {
            if let Some(saved) = self.saved_focus.take() {
                *cx.focus = saved;
            }
            self.destroy_job();
        } else if new == RunnerState::WaitInput {
            *cx.focus = FocusTarget::Input(self.id);
        } else if old == RunnerState::WaitInput && *cx.focus == FocusTarget::Input(self.id) {
            *cx.focus = FocusTarget::Runner(self.id);
        }
        Applied::Transitioned
    }

    fn destroy_job(&mut self) {
        if let Some(job) = self.job.take() {
            debug!(runner = %self.id, "destroying job");
            job.destroy();
        }
    }
}

/// Trim and drop one trailing full stop.
pub fn term_no_full_stop(s: &str) -> String {
    let t = s.trim();
    t.strip_suffix('.').unwrap_or(t).to_string()
}

/// Clean text typed into a runner's input; `None` when nothing is left.
pub fn submit_input(raw: &str) -> Option<String> {
    let s = term_no_full_stop(raw);
    (!s.is_empty()).then_some(s)
}

pub fn strip_pengine_uri(text: &str) -> String {
    PENGINE_URI.replace(text, "").into_owned()
}

pub fn normalize_error(code: Option<&str>, message: &str, job_id: Option<&str>) -> String {
    if code == Some(TOO_MANY_JOBS_CODE) {
        return TOO_MANY_JOBS_MESSAGE.to_string();
    }
    match job_id {
        Some(id) => message.replace(&format!("'{id}':"), ""),
        None => message.to_string(),
    }
}
