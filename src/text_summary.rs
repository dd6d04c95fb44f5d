//! Plain-text rendering of runners for CLI output.
//!
//! Tracks how much of each runner has been printed so text mode can emit
//! only what arrived since the last call.

use crate::model::{RunnerId, RunnerState};
use crate::runner::collection::RunnerCollection;
use crate::runner::{Fragment, Runner};
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Printed {
    header: bool,
    fragments: usize,
    state: Option<RunnerState>,
}

/// Incremental text view of a runner collection.
#[derive(Debug, Default)]
pub(crate) struct TextSummary {
    printed: HashMap<RunnerId, Printed>,
}

impl TextSummary {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Lines not yet emitted for any runner, in collection order.
    pub(crate) fn new_lines(&mut self, collection: &RunnerCollection) -> Vec<String> {
        let mut lines = Vec::new();
        for member in collection.members() {
            let runner = &member.runner;
            let seen = self.printed.entry(runner.id()).or_default();
            if !seen.header {
                lines.push(header_line(runner));
                seen.header = true;
            }
            for fragment in &runner.output()[seen.fragments..] {
                lines.extend(fragment_lines(fragment));
            }
            seen.fragments = runner.output().len();
            if runner.state().is_terminal() && seen.state != Some(runner.state()) {
                lines.push(format!("{} {}", runner.id(), runner.state()));
            }
            seen.state = Some(runner.state());
        }
        lines
    }
}

pub(crate) fn header_line(runner: &Runner) -> String {
    runner.title()
}

pub(crate) fn fragment_lines(fragment: &Fragment) -> Vec<String> {
    let text = match fragment {
        Fragment::Answer { .. } | Fragment::False => fragment.text(),
        Fragment::Output { text, location } => match location {
            Some(loc) => match loc.line {
                Some(line) => format!("{}:{line}: {}", loc.file, text.trim_end()),
                None => text.trim_end().to_string(),
            },
            None => text.trim_end().to_string(),
        },
        Fragment::Response(text) => format!("|: {text}"),
        Fragment::Error(msg) => format!("ERROR: {msg}"),
    };
    text.lines().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeJobClient;
    use crate::model::{Answer, JobEvent, Query};
    use crate::runner::Parity;
    use tokio::sync::mpsc;

    #[test]
    fn answers_and_errors_render_as_lines() {
        let answer = Fragment::Answer {
            answer: Answer {
                bindings: vec![("X".into(), "1".into()), ("Y".into(), "2".into())],
            },
            parity: Parity::Odd,
        };
        assert_eq!(fragment_lines(&answer), vec!["X = 1,", "Y = 2"]);
        assert_eq!(fragment_lines(&Fragment::False), vec!["false"]);
        assert_eq!(
            fragment_lines(&Fragment::Error("boom".into())),
            vec!["ERROR: boom"]
        );
        assert_eq!(
            fragment_lines(&Fragment::Response("42".into())),
            vec!["|: 42"]
        );
    }

    #[test]
    fn new_lines_are_incremental() {
        let (host, _rx) = mpsc::unbounded_channel();
        let mut c = RunnerCollection::new(host, 10);
        let client = FakeJobClient::new();
        let id = c.run(&client, Query::new("member(X,[1,2])."));
        let mut summary = TextSummary::new();
        assert_eq!(summary.new_lines(&c), vec!["#1 ?- member(X,[1,2])."]);
        assert!(summary.new_lines(&c).is_empty());

        c.dispatch(
            id,
            JobEvent::Success {
                answers: vec![Answer {
                    bindings: vec![("X".into(), "1".into())],
                }],
                more: false,
            },
        );
        assert_eq!(summary.new_lines(&c), vec!["X = 1", "#1 true"]);
        assert!(summary.new_lines(&c).is_empty());
    }
}
