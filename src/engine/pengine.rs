//! Pengines HTTP client.
//!
//! Every job runs as its own tokio task holding at most one ordinary request
//! in flight. `abort` travels on a second request so it can pre-empt a busy
//! job. All replies of a job are decoded and emitted by that single task,
//! which keeps event delivery FIFO per job.

use super::protocol::{self, Decoded, FollowUp};
use super::{EventSender, JobClient, JobControl, JobError, JobHandle};
use crate::model::{JobEvent, Query, RunConfig, RunnerId};
use crate::runner::term_no_full_stop;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Serialize)]
struct CreateRequest {
    application: String,
    ask: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    src_text: Option<String>,
    format: &'static str,
    destroy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk: Option<u32>,
}

pub struct PengineClient {
    http: reqwest::Client,
    server: String,
    application: String,
    chunk: Option<u32>,
    runtime: Handle,
    events: EventSender,
    sessions: RefCell<Vec<JoinHandle<()>>>,
}

impl PengineClient {
    pub fn new(cfg: &RunConfig, runtime: Handle, events: EventSender) -> Result<Self, JobError> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.timeout)
            .build()?;
        Ok(Self {
            http,
            server: cfg.server.trim_end_matches('/').to_string(),
            application: cfg.application.clone(),
            chunk: cfg.chunk,
            runtime,
            events,
            sessions: RefCell::new(Vec::new()),
        })
    }

    /// Wait up to `grace` for sessions still releasing their pengines.
    pub async fn shutdown(&self, grace: Duration) {
        let sessions = std::mem::take(&mut *self.sessions.borrow_mut());
        let pending = sessions.len();
        if tokio::time::timeout(grace, futures::future::join_all(sessions))
            .await
            .is_err()
        {
            warn!(pending, "sessions still running at shutdown");
        }
    }
}

impl JobClient for PengineClient {
    fn create(&self, runner: RunnerId, query: &Query) -> Box<dyn JobHandle> {
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<JobControl>();
        let session = Session {
            http: self.http.clone(),
            base: format!("{}/pengine", self.server),
            runner,
            events: self.events.clone(),
        };
        let request = CreateRequest {
            application: self.application.clone(),
            ask: term_no_full_stop(&query.goal),
            src_text: query.source.clone(),
            format: "json",
            destroy: false,
            chunk: self.chunk,
        };
        debug!(runner = %runner, ask = %request.ask, "creating pengine");
        let task = self.runtime.spawn(session.run(request, ctrl_rx));
        let mut sessions = self.sessions.borrow_mut();
        sessions.retain(|t| !t.is_finished());
        sessions.push(task);
        Box::new(PengineHandle { runner, ctrl_tx })
    }
}

/// Control handle; every call is a message to the job's session task.
struct PengineHandle {
    runner: RunnerId,
    ctrl_tx: mpsc::UnboundedSender<JobControl>,
}

impl PengineHandle {
    fn send(&self, ctrl: JobControl) {
        if self.ctrl_tx.send(ctrl).is_err() {
            trace!(runner = %self.runner, "session already finished");
        }
    }
}

impl JobHandle for PengineHandle {
    fn next(&mut self) {
        self.send(JobControl::Next);
    }

    fn stop(&mut self) {
        self.send(JobControl::Stop);
    }

    fn abort(&mut self) {
        self.send(JobControl::Abort);
    }

    fn respond(&mut self, text: &str) {
        self.send(JobControl::Respond(text.to_string()));
    }

    fn destroy(self: Box<Self>) {
        self.send(JobControl::Destroy);
    }
}

type Reply = BoxFuture<'static, Result<Value, JobError>>;

struct Session {
    http: reqwest::Client,
    base: String,
    runner: RunnerId,
    events: EventSender,
}

impl Session {
    async fn run(self, create: CreateRequest, mut ctrl_rx: mpsc::UnboundedReceiver<JobControl>) {
        let mut id: Option<String> = None;
        let mut inflight: Option<Reply> = Some(self.post_create(create));
        let mut abort_inflight: Option<Reply> = None;
        let mut abort_requested = false;
        let mut abort_delivered = false;
        let mut destroy_requested = false;

        loop {
            tokio::select! {
                ctrl = ctrl_rx.recv() => match ctrl {
                    Some(JobControl::Abort) => match &id {
                        Some(id) if abort_inflight.is_none() => {
                            abort_inflight = Some(self.get("abort", id, None));
                        }
                        Some(_) => trace!(runner = %self.runner, "abort already in flight"),
                        None => abort_requested = true,
                    },
                    Some(JobControl::Destroy) | None => {
                        destroy_requested = true;
                        if inflight.is_none() {
                            break;
                        }
                    }
                    Some(other) => {
                        if inflight.is_some() {
                            warn!(runner = %self.runner, control = ?other, "request outstanding; control ignored");
                            continue;
                        }
                        let Some(id) = &id else {
                            warn!(runner = %self.runner, control = ?other, "job not created yet; control ignored");
                            continue;
                        };
                        inflight = Some(self.get("send", id, Some(event_term(&other))));
                    }
                },
                reply = async {
                    match inflight.as_mut() {
                        Some(fut) => fut.await,
                        None => futures::future::pending().await,
                    }
                } => {
                    inflight = None;
                    let decoded = reply.and_then(|v| protocol::decode(&v));
                    abort_delivered |= matches!(&decoded, Ok(d) if d.events.contains(&JobEvent::Abort));
                    let follow_up = self.deliver(decoded, &mut id, destroy_requested);
                    if follow_up == FollowUp::Gone {
                        id = None;
                        break;
                    }
                    if abort_requested && abort_inflight.is_none() {
                        if let Some(id) = &id {
                            abort_requested = false;
                            abort_inflight = Some(self.get("abort", id, None));
                        }
                    }
                    if destroy_requested {
                        break;
                    }
                    if follow_up == FollowUp::PullResponse {
                        if let Some(id) = &id {
                            inflight = Some(self.get("pull_response", id, None));
                        }
                    }
                }
                reply = async {
                    match abort_inflight.as_mut() {
                        Some(fut) => fut.await,
                        None => futures::future::pending().await,
                    }
                } => {
                    abort_inflight = None;
                    let decoded = reply.and_then(|v| protocol::decode_abort(&v));
                    match self.deliver(decoded, &mut id, destroy_requested) {
                        FollowUp::Gone => {
                            id = None;
                            break;
                        }
                        // No request left to carry `aborted`; fetch it.
                        FollowUp::PullResponse
                            if inflight.is_none() && !abort_delivered && !destroy_requested =>
                        {
                            if let Some(id) = &id {
                                inflight = Some(self.get("pull_response", id, None));
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if let Some(id) = id {
            // Best effort: the server reclaims the pengine eventually anyway.
            match self.get("send", &id, Some("destroy".into())).await {
                Ok(_) => debug!(runner = %self.runner, pengine = %id, "pengine destroyed"),
                Err(e) => warn!(runner = %self.runner, pengine = %id, "destroy failed: {e}"),
            }
        }
    }

    /// Forward the events of a decoded reply. Returns what to do next.
    fn deliver(
        &self,
        decoded: Result<Decoded, JobError>,
        id: &mut Option<String>,
        muted: bool,
    ) -> FollowUp {
        match decoded {
            Ok(decoded) => {
                for event in decoded.events {
                    if let JobEvent::Created { id: new_id } = &event {
                        *id = Some(new_id.clone());
                    }
                    if !muted {
                        self.emit(event);
                    }
                }
                decoded.follow_up
            }
            Err(e) => {
                warn!(runner = %self.runner, "pengine request failed: {e}");
                if !muted {
                    self.emit(JobEvent::Error {
                        code: None,
                        message: e.to_string(),
                    });
                }
                FollowUp::Idle
            }
        }
    }

    fn emit(&self, event: JobEvent) {
        trace!(runner = %self.runner, event = event.kind(), "job event");
        let _ = self.events.send((self.runner, event));
    }

    fn post_create(&self, body: CreateRequest) -> Reply {
        let req = self.http.post(format!("{}/create", self.base)).json(&body);
        async move { read_reply(req.send().await?).await }.boxed()
    }

    fn get(&self, action: &str, id: &str, event: Option<String>) -> Reply {
        let mut params = vec![("id", id.to_string()), ("format", "json".to_string())];
        if let Some(event) = event {
            params.push(("event", event));
        }
        trace!(runner = %self.runner, action, "pengine request");
        let req = self
            .http
            .get(format!("{}/{}", self.base, action))
            .query(&params);
        async move { read_reply(req.send().await?).await }.boxed()
    }
}

async fn read_reply(resp: reqwest::Response) -> Result<Value, JobError> {
    let status = resp.status();
    let body = resp.text().await?;
    match serde_json::from_str::<Value>(&body) {
        // Error events are also sent with non-2xx statuses; keep them.
        Ok(v) if status.is_success() || v.get("event").is_some() => Ok(v),
        Ok(_) => Err(JobError::Status { status, body }),
        Err(_) if !status.is_success() => Err(JobError::Status { status, body }),
        Err(e) => Err(e.into()),
    }
}

fn event_term(ctrl: &JobControl) -> String {
    match ctrl {
        JobControl::Next => "next".into(),
        JobControl::Stop => "stop".into(),
        JobControl::Abort => "abort".into(),
        JobControl::Destroy => "destroy".into(),
        JobControl::Respond(text) => format!("input(({text}))"),
    }
}
