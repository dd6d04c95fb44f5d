//! Runner lifecycle controller.
//!
//! Owns the job client and the runner collection, routes UI commands and job
//! callbacks to them, and collects host notifications for presentation layers.

use crate::engine::{EventReceiver, JobClient};
use crate::model::{HostEvent, JobEvent, Query, RunnerId};
use crate::runner::collection::RunnerCollection;
use crate::runner::{Applied, FocusTarget, RunnerAction};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

/// Commands emitted by UI layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UiCommand {
    Run(Query),
    Runner(RunnerId, RunnerAction),
    /// Action for whichever runner has focus; ignored when none does.
    Focused(RunnerAction),
    Focus(FocusTarget),
    FocusPrev,
    FocusNext,
    CollapseAll,
    ExpandAll,
    StopAll,
    Clear,
    Resize(usize),
    Scroll(isize),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Quit,
}

pub(crate) struct Controller<C: JobClient> {
    client: C,
    collection: RunnerCollection,
    events: EventReceiver,
    host_rx: UnboundedReceiver<HostEvent>,
}

impl<C: JobClient> Controller<C> {
    pub(crate) fn new(client: C, events: EventReceiver, height: usize) -> Self {
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        Self {
            client,
            collection: RunnerCollection::new(host_tx, height),
            events,
            host_rx,
        }
    }

    pub(crate) fn client(&self) -> &C {
        &self.client
    }

    pub(crate) fn collection(&self) -> &RunnerCollection {
        &self.collection
    }

    pub(crate) fn handle(&mut self, cmd: UiCommand) -> Flow {
        match cmd {
            UiCommand::Run(query) => {
                if query.goal.trim().is_empty() {
                    debug!("empty goal ignored");
                } else {
                    self.collection.run(&self.client, query);
                }
            }
            UiCommand::Runner(id, action) => {
                self.collection.perform(id, action);
            }
            UiCommand::Focused(action) => {
                if let Some(id) = self.collection.focused_runner() {
                    self.collection.perform(id, action);
                }
            }
            UiCommand::Focus(target) => self.collection.set_focus(target),
            UiCommand::FocusPrev => self.collection.focus_prev(),
            UiCommand::FocusNext => self.collection.focus_next(),
            UiCommand::CollapseAll => self.collection.collapse_all(),
            UiCommand::ExpandAll => self.collection.expand_all(),
            UiCommand::StopAll => self.collection.stop_all(),
            UiCommand::Clear => self.collection.clear(),
            UiCommand::Resize(height) => self.collection.resize(height),
            UiCommand::Scroll(delta) => self.collection.scroll_by(delta),
            UiCommand::Quit => {
                info!(runners = self.collection.len(), "shutting down");
                self.collection.clear();
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    /// Apply every job callback received so far without blocking. Returns
    /// whether anything changed.
    pub(crate) fn pump(&mut self) -> bool {
        let mut changed = false;
        while let Ok((id, event)) = self.events.try_recv() {
            changed |= self.apply(id, event) != Applied::Unchanged;
        }
        changed
    }

    /// Wait for the next job callback.
    pub(crate) async fn next_event(&mut self) -> Option<(RunnerId, JobEvent)> {
        self.events.recv().await
    }

    pub(crate) fn apply(&mut self, id: RunnerId, event: JobEvent) -> Applied {
        self.collection.dispatch(id, event)
    }

    /// Take the notifications queued for the host since the last call.
    pub(crate) fn host_events(&mut self) -> Vec<HostEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.host_rx.try_recv() {
            out.push(ev);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{Call, FakeJobClient};
    use crate::model::{Answer, RunnerState, SourceLocation};

    fn controller() -> (
        Controller<FakeJobClient>,
        FakeJobClient,
        crate::engine::EventSender,
    ) {
        let client = FakeJobClient::new();
        let (tx, rx) = mpsc::unbounded_channel();
        (Controller::new(client.clone(), rx, 10), client, tx)
    }

    #[test]
    fn pump_routes_events_to_runners() {
        let (mut c, _client, tx) = controller();
        c.handle(UiCommand::Run(Query::new("member(X,[1,2])")));
        let id = c.collection().members()[0].runner.id();

        assert!(!c.pump());
        tx.send((id, JobEvent::Created { id: "p".into() })).unwrap();
        tx.send((
            id,
            JobEvent::Success {
                answers: vec![Answer::default()],
                more: true,
            },
        ))
        .unwrap();
        assert!(c.pump());
        assert_eq!(
            c.collection().get(id).unwrap().runner.state(),
            RunnerState::WaitNext
        );
    }

    #[test]
    fn focused_action_targets_focused_runner() {
        let (mut c, client, tx) = controller();
        c.handle(UiCommand::Run(Query::new("member(X,[1,2])")));
        let id = c.collection().members()[0].runner.id();
        tx.send((
            id,
            JobEvent::Success {
                answers: vec![Answer::default()],
                more: true,
            },
        ))
        .unwrap();
        c.pump();
        assert_eq!(c.collection().focus(), FocusTarget::Runner(id));

        c.handle(UiCommand::Focused(RunnerAction::Next));
        assert_eq!(client.count(&Call::Next(id)), 1);
    }

    #[test]
    fn blank_goal_is_not_run() {
        let (mut c, client, _tx) = controller();
        c.handle(UiCommand::Run(Query::new("   ")));
        assert!(c.collection().is_empty());
        assert!(client.calls().is_empty());
    }

    #[test]
    fn quit_destroys_alive_jobs() {
        let (mut c, client, _tx) = controller();
        c.handle(UiCommand::Run(Query::new("repeat")));
        let id = c.collection().members()[0].runner.id();
        assert_eq!(c.handle(UiCommand::Quit), Flow::Quit);
        assert_eq!(client.destroys(id), 1);
    }

    #[test]
    fn host_events_are_collected() {
        let (mut c, _client, tx) = controller();
        c.handle(UiCommand::Run(Query::new("true")));
        let id = c.collection().members()[0].runner.id();
        tx.send((
            id,
            JobEvent::Output {
                text: "Warning: x".into(),
                location: Some(SourceLocation {
                    file: "src".into(),
                    line: Some(1),
                    character: None,
                }),
            },
        ))
        .unwrap();
        c.pump();
        c.handle(UiCommand::Focused(RunnerAction::Help));
        let events = c.host_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], HostEvent::Help { .. }));
        assert!(c.host_events().is_empty());
    }
}
