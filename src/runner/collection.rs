//! Ordered stack of runners sharing one viewport and one focus.

use super::viewport::Viewport;
use super::{Applied, FocusTarget, HostSender, Runner, RunnerAction, RunnerContext};
use crate::engine::JobClient;
use crate::model::{JobEvent, Query, RunnerId};
use tracing::{debug, info};

pub struct Member {
    pub runner: Runner,
    /// Collapsed to its title line. Presentation only.
    pub iconified: bool,
}

pub struct RunnerCollection {
    members: Vec<Member>,
    next_id: u64,
    focus: FocusTarget,
    viewport: Viewport,
    host: HostSender,
}

impl RunnerCollection {
    pub fn new(host: HostSender, height: usize) -> Self {
        Self {
            members: Vec::new(),
            next_id: 1,
            focus: FocusTarget::Editor,
            viewport: Viewport::new(height),
            host,
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, id: RunnerId) -> Option<&Member> {
        self.members.iter().find(|m| m.runner.id() == id)
    }

    pub fn focus(&self) -> FocusTarget {
        self.focus
    }

    pub fn set_focus(&mut self, focus: FocusTarget) {
        self.focus = focus;
        self.repair_focus(None);
    }

    /// The runner keyboard shortcuts apply to.
    pub fn focused_runner(&self) -> Option<RunnerId> {
        self.focus.runner()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Start a new runner at the bottom of the stack.
    pub fn run(&mut self, client: &dyn JobClient, query: Query) -> RunnerId {
        if query.iconify_previous {
            self.iconify_last();
        }

        let id = RunnerId(self.next_id);
        self.next_id += 1;
        info!(runner = %id, goal = %query.goal, "running query");

        let mut runner = Runner::new(id, query, &mut self.focus);
        let mut cx = RunnerContext {
            focus: &mut self.focus,
            host: &self.host,
        };
        runner.start(client, &mut cx);
        self.members.push(Member {
            runner,
            iconified: false,
        });
        self.scroll_to_bottom(false);
        id
    }

    /// Collapse the last runner unless its query is still alive.
    pub fn iconify_last(&mut self) {
        if let Some(last) = self.members.last_mut() {
            if !last.runner.alive() {
                last.iconified = true;
            }
        }
    }

    /// Route a job callback to its runner.
    pub fn dispatch(&mut self, id: RunnerId, event: JobEvent) -> Applied {
        let Self {
            members,
            focus,
            host,
            ..
        } = self;
        let Some(member) = members.iter_mut().find(|m| m.runner.id() == id) else {
            debug!(runner = %id, event = event.kind(), "event for closed runner dropped");
            return Applied::Unchanged;
        };
        let mut cx = RunnerContext { focus, host };
        let applied = member.runner.handle_job_event(event, &mut cx);
        self.after(applied);
        applied
    }

    pub fn perform(&mut self, id: RunnerId, action: RunnerAction) -> Applied {
        match action {
            RunnerAction::Close => {
                self.close(id);
                Applied::Transitioned
            }
            RunnerAction::ToggleIconic => {
                self.toggle_iconic(id);
                Applied::Updated
            }
            action => {
                let Self {
                    members,
                    focus,
                    host,
                    ..
                } = self;
                let Some(member) = members.iter_mut().find(|m| m.runner.id() == id) else {
                    return Applied::Unchanged;
                };
                let mut cx = RunnerContext { focus, host };
                let applied = member.runner.perform(&action, &mut cx);
                self.after(applied);
                applied
            }
        }
    }

    /// Destroy the runner's job if alive and remove it.
    pub fn close(&mut self, id: RunnerId) -> bool {
        let Some(idx) = self.members.iter().position(|m| m.runner.id() == id) else {
            return false;
        };
        let mut member = self.members.remove(idx);
        member.runner.close();
        debug!(runner = %id, "runner closed");
        self.repair_focus(member.runner.saved_focus());
        self.scroll_to_bottom(true);
        true
    }

    /// Close every runner.
    pub fn clear(&mut self) {
        let ids: Vec<RunnerId> = self.members.iter().map(|m| m.runner.id()).collect();
        for id in ids {
            self.close(id);
        }
        self.focus = FocusTarget::Editor;
    }

    pub fn collapse_all(&mut self) {
        self.set_all_iconic(true);
    }

    pub fn expand_all(&mut self) {
        self.set_all_iconic(false);
    }

    fn set_all_iconic(&mut self, on: bool) {
        for m in &mut self.members {
            m.iconified = on;
        }
        self.scroll_to_bottom(true);
    }

    pub fn toggle_iconic(&mut self, id: RunnerId) {
        if let Some(m) = self.members.iter_mut().find(|m| m.runner.id() == id) {
            m.iconified = !m.iconified;
            self.scroll_to_bottom(true);
        }
    }

    /// Ask every runner to stop. Runners not waiting for a next answer
    /// ignore it.
    pub fn stop_all(&mut self) {
        let ids: Vec<RunnerId> = self.members.iter().map(|m| m.runner.id()).collect();
        for id in ids {
            self.perform(id, RunnerAction::Stop);
        }
    }

    pub fn resize(&mut self, height: usize) {
        self.viewport.set_height(height);
        self.scroll_to_bottom(true);
    }

    pub fn scroll_by(&mut self, delta: isize) {
        self.viewport.scroll_by(delta);
    }

    /// Move focus to the previous runner (towards older queries).
    pub fn focus_prev(&mut self) {
        let idx = match self.focus_index() {
            Some(0) => 0,
            Some(i) => i - 1,
            None => match self.members.len() {
                0 => return,
                n => n - 1,
            },
        };
        self.focus = FocusTarget::Runner(self.members[idx].runner.id());
    }

    /// Move focus to the next runner; past the last one focus returns to the
    /// editor.
    pub fn focus_next(&mut self) {
        match self.focus_index() {
            Some(i) if i + 1 < self.members.len() => {
                self.focus = FocusTarget::Runner(self.members[i + 1].runner.id());
            }
            _ => self.focus = FocusTarget::Editor,
        }
    }

    pub fn content_height(&self) -> usize {
        self.members
            .iter()
            .map(|m| m.runner.display_lines(m.iconified))
            .sum()
    }

    fn focus_index(&self) -> Option<usize> {
        let id = self.focus.runner()?;
        self.members.iter().position(|m| m.runner.id() == id)
    }

    fn after(&mut self, applied: Applied) {
        match applied {
            Applied::Transitioned => self.scroll_to_bottom(false),
            Applied::Updated => self.scroll_to_bottom(true),
            Applied::Unchanged => {}
        }
        self.repair_focus(None);
    }

    fn scroll_to_bottom(&mut self, only_down: bool) {
        let content = self.content_height();
        self.viewport.scroll_to_bottom(content, only_down);
    }

    /// Focus may point at a runner that is gone: fall back to `preferred`
    /// if that still exists, else the editor.
    fn repair_focus(&mut self, preferred: Option<FocusTarget>) {
        let exists = |f: FocusTarget| match f.runner() {
            None => true,
            Some(id) => self.members.iter().any(|m| m.runner.id() == id),
        };
        if exists(self.focus) {
            return;
        }
        self.focus = preferred.filter(|f| exists(*f)).unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{Call, FakeJobClient};
    use crate::model::{Answer, RunnerState};
    use tokio::sync::mpsc;

    fn collection() -> (RunnerCollection, FakeJobClient) {
        let (host, _rx) = mpsc::unbounded_channel();
        (RunnerCollection::new(host, 20), FakeJobClient::new())
    }

    fn finish(c: &mut RunnerCollection, id: RunnerId) {
        c.dispatch(id, JobEvent::Created { id: format!("p{}", id.0) });
        c.dispatch(
            id,
            JobEvent::Success {
                answers: vec![Answer::default()],
                more: false,
            },
        );
    }

    #[test]
    fn run_appends_in_order_and_focuses_new_runner() {
        let (mut c, client) = collection();
        let a = c.run(&client, Query::new("a"));
        let b = c.run(&client, Query::new("b"));
        let ids: Vec<_> = c.members().iter().map(|m| m.runner.id()).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(c.focus(), FocusTarget::Runner(b));
        assert_eq!(c.get(b).unwrap().runner.saved_focus(), Some(FocusTarget::Runner(a)));
        assert!(c.members().iter().all(|m| m.runner.state() == RunnerState::Running));
    }

    #[test]
    fn iconifies_previous_only_when_not_alive() {
        let (mut c, client) = collection();
        let a = c.run(&client, Query::new("repeat"));
        let b = c.run(&client, Query::new("true"));
        assert!(!c.get(a).unwrap().iconified);

        finish(&mut c, b);
        let d = c.run(&client, Query::new("true"));
        assert!(c.get(b).unwrap().iconified);
        assert!(!c.get(d).unwrap().iconified);

        finish(&mut c, d);
        c.run(&client, Query::new("x").with_iconify_previous(false));
        assert!(!c.get(d).unwrap().iconified);
    }

    #[test]
    fn clear_destroys_alive_jobs_only() {
        let (mut c, client) = collection();
        let a = c.run(&client, Query::new("true"));
        let b = c.run(&client, Query::new("fail"));
        let d = c.run(&client, Query::new("repeat"));
        finish(&mut c, a);
        c.dispatch(b, JobEvent::Failure);
        assert_eq!(client.destroys(a), 1);
        assert_eq!(client.destroys(b), 1);
        assert_eq!(client.destroys(d), 0);

        c.clear();
        assert!(c.is_empty());
        assert_eq!(client.destroys(a), 1);
        assert_eq!(client.destroys(b), 1);
        assert_eq!(client.destroys(d), 1);
        assert_eq!(c.focus(), FocusTarget::Editor);
    }

    #[test]
    fn close_restores_focus_of_removed_runner() {
        let (mut c, client) = collection();
        let a = c.run(&client, Query::new("repeat"));
        let b = c.run(&client, Query::new("repeat"));
        assert_eq!(c.focus(), FocusTarget::Runner(b));
        c.perform(b, RunnerAction::Close);
        assert_eq!(c.focus(), FocusTarget::Runner(a));
        c.perform(a, RunnerAction::Close);
        assert_eq!(c.focus(), FocusTarget::Editor);
        assert!(!c.close(a));
    }

    #[test]
    fn events_for_closed_runner_are_dropped() {
        let (mut c, client) = collection();
        let a = c.run(&client, Query::new("repeat"));
        c.close(a);
        assert_eq!(c.dispatch(a, JobEvent::Abort), Applied::Unchanged);
        assert_eq!(client.destroys(a), 1);
    }

    #[test]
    fn collapse_and_expand_keep_state() {
        let (mut c, client) = collection();
        let a = c.run(&client, Query::new("repeat"));
        let b = c.run(&client, Query::new("true"));
        finish(&mut c, b);
        c.collapse_all();
        assert!(c.members().iter().all(|m| m.iconified));
        assert_eq!(c.get(a).unwrap().runner.state(), RunnerState::Running);
        assert_eq!(c.content_height(), 2);
        c.expand_all();
        assert!(c.members().iter().all(|m| !m.iconified));
        c.perform(a, RunnerAction::ToggleIconic);
        assert!(c.get(a).unwrap().iconified);
    }

    #[test]
    fn stop_all_reaches_only_waiting_runners() {
        let (mut c, client) = collection();
        let a = c.run(&client, Query::new("member(X,[1,2])"));
        let b = c.run(&client, Query::new("repeat"));
        c.dispatch(
            a,
            JobEvent::Success {
                answers: vec![Answer::default()],
                more: true,
            },
        );
        c.stop_all();
        assert_eq!(client.count(&Call::Stop(a)), 1);
        assert_eq!(client.count(&Call::Stop(b)), 0);
    }

    #[test]
    fn viewport_follows_new_runners() {
        let (host, _rx) = mpsc::unbounded_channel();
        let mut c = RunnerCollection::new(host, 4);
        let client = FakeJobClient::new();
        let a = c.run(&client, Query::new("a"));
        assert_eq!(c.viewport().stretch(), 2);
        for _ in 0..5 {
            c.dispatch(
                a,
                JobEvent::Output {
                    text: "line".into(),
                    location: None,
                },
            );
        }
        assert_eq!(c.content_height(), 7);
        assert_eq!(c.viewport().content(), 7);
        assert_eq!(c.viewport().height(), 4);
        assert_eq!(c.viewport().stretch(), 0);
        assert_eq!(c.viewport().offset(), 3);
    }

    #[test]
    fn focus_walks_members() {
        let (mut c, client) = collection();
        let a = c.run(&client, Query::new("a"));
        let b = c.run(&client, Query::new("b"));
        c.set_focus(FocusTarget::Editor);
        c.focus_prev();
        assert_eq!(c.focused_runner(), Some(b));
        c.focus_prev();
        assert_eq!(c.focused_runner(), Some(a));
        c.focus_prev();
        assert_eq!(c.focused_runner(), Some(a));
        c.focus_next();
        c.focus_next();
        assert_eq!(c.focus(), FocusTarget::Editor);
    }
}
