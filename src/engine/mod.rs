//! Remote job abstraction.
//!
//! A `JobClient` creates jobs; each job is driven through a `JobHandle` whose
//! calls only enqueue work and return. Results come back as `JobEvent`s on the
//! shared event channel, tagged with the owning runner.

#[cfg(test)]
pub(crate) mod fake;
pub(crate) mod pengine;
pub(crate) mod protocol;

use crate::model::{JobEvent, Query, RunnerId};
use thiserror::Error;
use tokio::sync::mpsc;

pub type EventSender = mpsc::UnboundedSender<(RunnerId, JobEvent)>;
pub type EventReceiver = mpsc::UnboundedReceiver<(RunnerId, JobEvent)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobControl {
    /// Ask for the next solution
    Next,
    /// Stop after the current answer
    Stop,
    /// Terminate immediately, pre-empting any outstanding request
    Abort,
    /// Answer a prompt
    Respond(String),
    /// Release the remote job
    Destroy,
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid JSON reply: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server replied with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Factory for remote jobs.
pub trait JobClient {
    /// Start creating a job for `query`. The goal is submitted with the
    /// creation request; `JobEvent::Created` follows once the job exists.
    fn create(&self, runner: RunnerId, query: &Query) -> Box<dyn JobHandle>;
}

/// Control side of one job. At most one request is outstanding at a time,
/// except `abort`.
pub trait JobHandle {
    fn next(&mut self);
    fn stop(&mut self);
    fn abort(&mut self);
    fn respond(&mut self, text: &str);
    /// Release remote resources. Consumes the handle, so it can run only once.
    fn destroy(self: Box<Self>);
}
