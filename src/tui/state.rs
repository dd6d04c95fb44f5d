use crate::hover::{self, HoverProvider};
use crate::model::HostEvent;
use ratatui::{
    style::{Color, Style},
    text::{Line, Span},
};
use time::OffsetDateTime;

const MAX_DIAGNOSTICS: usize = 50;

/// Single-line text field with a byte-offset cursor.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LineEdit {
    pub text: String,
    pub cursor: usize,
}

impl LineEdit {
    pub fn insert(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    pub fn backspace(&mut self) {
        if let Some(c) = self.text[..self.cursor].chars().next_back() {
            self.cursor -= c.len_utf8();
            self.text.remove(self.cursor);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.len() {
            self.text.remove(self.cursor);
        }
    }

    pub fn left(&mut self) {
        if let Some(c) = self.text[..self.cursor].chars().next_back() {
            self.cursor -= c.len_utf8();
        }
    }

    pub fn right(&mut self) {
        if let Some(c) = self.text[self.cursor..].chars().next() {
            self.cursor += c.len_utf8();
        }
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.len();
    }

    /// Return the text and reset the field.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }
}

/// A located message reported by a query, shown until cleared.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub at: OffsetDateTime,
    pub message: String,
}

pub struct UiState {
    pub editor: LineEdit,
    /// Response typed into a runner waiting for input
    pub input: LineEdit,
    /// Previously run goals, oldest first
    pub history: Vec<String>,
    pub history_pos: Option<usize>,
    pub info: String,
    pub diagnostics: Vec<Diagnostic>,
    /// Topic of the help overlay, when shown
    pub help: Option<String>,
    pub hover: HoverProvider,
    pub hover_text: Option<String>,
    pub runner_rows: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            editor: LineEdit::default(),
            input: LineEdit::default(),
            history: Vec::new(),
            history_pos: None,
            info: "Type a goal and press Enter. F1 for help.".into(),
            diagnostics: Vec::new(),
            help: None,
            hover: HoverProvider::new(),
            hover_text: None,
            runner_rows: 0,
        }
    }
}

impl UiState {
    pub fn apply_host_event(&mut self, ev: HostEvent) {
        match ev {
            HostEvent::Help { topic } => self.help = Some(topic),
            ev @ HostEvent::SourceError { .. } => {
                let at = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
                self.diagnostics.push(Diagnostic {
                    at,
                    message: ev.to_message(),
                });
                if self.diagnostics.len() > MAX_DIAGNOSTICS {
                    self.diagnostics.remove(0);
                }
            }
        }
    }

    /// Recompute the hover help for the token under the editor cursor.
    pub fn refresh_hover(&mut self) {
        let tokens = hover::classify(&self.editor.text);
        let pos = self.editor.cursor.saturating_sub(1);
        self.hover_text = hover::token_at(&tokens, pos)
            .and_then(|t| self.hover.lookup(&t.kind, t.enriched.as_ref()))
            .map(|c| c.to_text());
    }

    pub fn remember(&mut self, goal: &str) {
        if self.history.last().map(String::as_str) != Some(goal) {
            self.history.push(goal.to_string());
        }
        self.history_pos = None;
    }

    /// Step through previous goals; `back` moves towards older ones.
    pub fn recall(&mut self, back: bool) {
        if self.history.is_empty() {
            return;
        }
        let last = self.history.len() - 1;
        self.history_pos = match (self.history_pos, back) {
            (None, true) => Some(last),
            (None, false) => return,
            (Some(0), true) => Some(0),
            (Some(i), true) => Some(i - 1),
            (Some(i), false) if i >= last => None,
            (Some(i), false) => Some(i + 1),
        };
        self.editor.text = self
            .history_pos
            .map(|i| self.history[i].clone())
            .unwrap_or_default();
        self.editor.end();
    }
}

/// Status line: the latest diagnostic if any, else the info message.
pub fn status_line(state: &UiState) -> Line<'static> {
    match state.diagnostics.last() {
        Some(d) => {
            let stamp = d
                .at
                .format(time::macros::format_description!("[hour]:[minute]:[second]"))
                .unwrap_or_default();
            Line::from(vec![
                Span::styled(format!("[{stamp}] "), Style::default().fg(Color::DarkGray)),
                Span::styled(d.message.clone(), Style::default().fg(Color::Yellow)),
            ])
        }
        None => Line::from(Span::styled(
            state.info.clone(),
            Style::default().fg(Color::Gray),
        )),
    }
}
