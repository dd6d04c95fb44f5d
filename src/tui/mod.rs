mod help;
mod state;

use crate::cli::{make_query, SHUTDOWN_GRACE};
use crate::engine::pengine::PengineClient;
use crate::engine::EventReceiver;
use crate::model::{RunConfig, RunnerState};
use crate::orchestrator::{Controller, Flow, UiCommand};
use crate::runner::collection::{Member, RunnerCollection};
use crate::runner::{keys, submit_input, FocusTarget, Fragment, Parity, RunnerAction, HELP_TOPIC};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Terminal,
};
use state::{LineEdit, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Rows used by everything except the runner area: status line, editor box,
/// footer and the runner block's borders.
const CHROME_ROWS: usize = 7;

pub async fn run(cfg: RunConfig) -> Result<()> {
    // Unbounded channels avoid backpressure and task switching in the hot path.
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let runtime = Handle::current();
    let client = PengineClient::new(&cfg, runtime.clone(), event_tx)
        .context("failed to create HTTP client")?;

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(cfg, client, event_rx, runtime));

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    match join_res {
        Ok(Ok(res)) => res,
        Ok(Err(_)) => Err(anyhow::anyhow!("TUI thread panicked")),
        Err(e) => Err(anyhow::anyhow!("TUI thread join failed: {e}")),
    }
}

/// Run the TUI loop on a dedicated thread. The controller and every runner
/// live here; job sessions run on the Tokio runtime and report back through
/// `event_rx`.
pub fn run_threaded(
    cfg: RunConfig,
    client: PengineClient,
    event_rx: EventReceiver,
    runtime: Handle,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let rows = terminal
        .size()
        .map(|size| runner_rows(size.height))
        .unwrap_or(20);
    let mut controller = Controller::new(client, event_rx, rows);
    let mut state = UiState {
        runner_rows: rows,
        ..Default::default()
    };
    for goal in &cfg.queries {
        state.remember(goal);
        controller.handle(UiCommand::Run(make_query(&cfg, goal)));
    }

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain job events without blocking; runners are only touched from this thread.
        controller.pump();
        for ev in controller.host_events() {
            state.apply_host_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            if let Ok(size) = terminal.size() {
                let rows = runner_rows(size.height);
                if rows != state.runner_rows {
                    state.runner_rows = rows;
                    controller.handle(UiCommand::Resize(rows));
                }
            }
            terminal
                .draw(|f| draw(f.area(), f, &state, controller.collection()))
                .ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                let focus = controller.collection().focus();
                if let Some(cmd) = handle_key(&mut state, focus, &cfg, k) {
                    if controller.handle(cmd) == Flow::Quit {
                        break Ok(());
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();

    runtime.block_on(controller.client().shutdown(SHUTDOWN_GRACE));
    res
}

fn runner_rows(height: u16) -> usize {
    (height as usize).saturating_sub(CHROME_ROWS).max(1)
}

/// Name of a key as used by the runner shortcut table.
fn key_name(code: KeyCode) -> Option<&'static str> {
    let name = match code {
        KeyCode::Char(';') => ";",
        KeyCode::Char(' ') => "Space",
        KeyCode::Char('.') => ".",
        KeyCode::Char('a') => "a",
        KeyCode::Char('_') => "_",
        KeyCode::Enter => "Enter",
        KeyCode::Esc => "Esc",
        KeyCode::Delete => "Del",
        KeyCode::F(1) => "F1",
        _ => return None,
    };
    Some(name)
}

fn edit_line(edit: &mut LineEdit, code: KeyCode) -> bool {
    match code {
        KeyCode::Char(c) => edit.insert(c),
        KeyCode::Backspace => edit.backspace(),
        KeyCode::Delete => edit.delete(),
        KeyCode::Left => edit.left(),
        KeyCode::Right => edit.right(),
        KeyCode::Home => edit.home(),
        KeyCode::End => edit.end(),
        _ => return false,
    }
    true
}

/// Translate a key press into a controller command, updating local UI state
/// (editor text, overlays) along the way.
fn handle_key(
    state: &mut UiState,
    focus: FocusTarget,
    cfg: &RunConfig,
    k: KeyEvent,
) -> Option<UiCommand> {
    if state.help.take().is_some() {
        return None;
    }

    let page = (state.runner_rows / 2).max(1) as isize;
    match (k.modifiers, k.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => return Some(UiCommand::Quit),
        (KeyModifiers::CONTROL, KeyCode::Char('s')) => return Some(UiCommand::StopAll),
        (KeyModifiers::CONTROL, KeyCode::Char('o')) => return Some(UiCommand::CollapseAll),
        (KeyModifiers::CONTROL, KeyCode::Char('e')) => return Some(UiCommand::ExpandAll),
        (KeyModifiers::CONTROL, KeyCode::Char('l')) => {
            state.diagnostics.clear();
            return Some(UiCommand::Clear);
        }
        (_, KeyCode::Tab) => return Some(UiCommand::FocusNext),
        (_, KeyCode::BackTab) => return Some(UiCommand::FocusPrev),
        (_, KeyCode::PageUp) => return Some(UiCommand::Scroll(-page)),
        (_, KeyCode::PageDown) => return Some(UiCommand::Scroll(page)),
        _ => {}
    }

    match focus {
        FocusTarget::Editor => match k.code {
            KeyCode::Enter => {
                let goal = state.editor.take();
                state.hover_text = None;
                if goal.trim().is_empty() {
                    return None;
                }
                state.remember(goal.trim());
                Some(UiCommand::Run(make_query(cfg, &goal)))
            }
            KeyCode::Up => {
                state.recall(true);
                None
            }
            KeyCode::Down => {
                state.recall(false);
                None
            }
            KeyCode::F(1) => {
                state.help = Some(HELP_TOPIC.to_string());
                None
            }
            code => {
                if edit_line(&mut state.editor, code) {
                    state.refresh_hover();
                }
                None
            }
        },
        FocusTarget::Runner(_) => {
            if let Some(action) = key_name(k.code).and_then(keys::binding) {
                return Some(UiCommand::Focused(action));
            }
            // Typing anywhere else goes to the goal editor.
            if let KeyCode::Char(c) = k.code {
                state.editor.insert(c);
                state.refresh_hover();
                return Some(UiCommand::Focus(FocusTarget::Editor));
            }
            None
        }
        FocusTarget::Input(id) => match k.code {
            KeyCode::Enter => {
                let text = submit_input(&state.input.text)?;
                state.input.take();
                Some(UiCommand::Runner(id, RunnerAction::Respond(text)))
            }
            KeyCode::Esc => Some(UiCommand::Runner(id, RunnerAction::Abort)),
            KeyCode::F(1) => Some(UiCommand::Runner(id, RunnerAction::Help)),
            code => {
                edit_line(&mut state.input, code);
                None
            }
        },
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState, runners: &RunnerCollection) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(3),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(area);

    draw_runners(chunks[0], f, state, runners);
    f.render_widget(Paragraph::new(state::status_line(state)), chunks[1]);
    draw_editor(chunks[2], f, state, runners.focus() == FocusTarget::Editor);
    f.render_widget(
        Paragraph::new(Line::from(
            "Keys: Enter run | Tab focus | ; next | . stop | a abort | Del close | _ collapse | Ctrl-C quit | F1 help",
        ))
        .style(Style::default().fg(Color::DarkGray)),
        chunks[3],
    );

    if let Some(topic) = state.help.as_deref() {
        help::draw_help(area, f, topic);
    }
}

fn draw_runners(area: Rect, f: &mut ratatui::Frame, state: &UiState, runners: &RunnerCollection) {
    let viewport = runners.viewport();
    let rows = area.height.saturating_sub(2) as usize;
    let mut lines: Vec<Line> = vec![Line::from(""); viewport.stretch().min(rows)];
    let content = runners
        .members()
        .iter()
        .flat_map(|m| member_lines(m, runners.focus(), &state.input));
    lines.extend(content.skip(viewport.offset()).take(rows - lines.len()));

    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(runners_title(runners)),
    );
    f.render_widget(p, area);
}

/// Runner counts, plus the visible row range once the content overflows.
fn runners_title(runners: &RunnerCollection) -> String {
    let alive = runners.members().iter().filter(|m| m.runner.alive()).count();
    let mut title = format!("Runners ({} / {} alive)", runners.len(), alive);
    let viewport = runners.viewport();
    if viewport.content() > viewport.height() {
        let first = viewport.offset() + 1;
        let last = (viewport.offset() + viewport.height()).min(viewport.content());
        title.push_str(&format!(" rows {first}-{last} of {}", viewport.content()));
    }
    title
}

fn state_color(s: RunnerState) -> Color {
    match s {
        RunnerState::Idle | RunnerState::Running => Color::Yellow,
        RunnerState::WaitNext | RunnerState::WaitInput => Color::Cyan,
        RunnerState::True => Color::Green,
        RunnerState::False | RunnerState::Error => Color::Red,
        RunnerState::Stopped | RunnerState::Aborted => Color::Magenta,
    }
}

/// Rows for one runner; always `runner.display_lines(iconified)` long.
fn member_lines(member: &Member, focus: FocusTarget, input: &LineEdit) -> Vec<Line<'static>> {
    let runner = &member.runner;
    let focused = focus.runner() == Some(runner.id());
    let marker = if focused { "▶ " } else { "  " };
    let mut title_style = Style::default();
    if focused {
        title_style = title_style.add_modifier(Modifier::BOLD);
    }
    let mut lines = vec![Line::from(vec![
        Span::styled(marker, Style::default().fg(Color::Yellow)),
        Span::styled(runner.title(), title_style),
        Span::raw(" "),
        Span::styled(
            format!("[{}]", runner.state()),
            Style::default().fg(state_color(runner.state())),
        ),
        Span::raw(if member.iconified { " …" } else { "" }),
    ])];
    if member.iconified {
        return lines;
    }

    for fragment in runner.output() {
        let style = match fragment {
            Fragment::Answer {
                parity: Parity::Odd,
                ..
            } => Style::default().fg(Color::Cyan),
            Fragment::Answer {
                parity: Parity::Even,
                ..
            } => Style::default().fg(Color::Green),
            Fragment::Output { .. } => Style::default().fg(Color::Gray),
            Fragment::Response(_) => Style::default().fg(Color::Yellow),
            Fragment::False | Fragment::Error(_) => Style::default().fg(Color::Red),
        };
        let text = fragment.text();
        let mut count = 0;
        for l in text.lines() {
            lines.push(Line::from(Span::styled(format!("    {l}"), style)));
            count += 1;
        }
        if count == 0 {
            lines.push(Line::from(""));
        }
    }

    if runner.alive() {
        let mut controls = vec![Span::raw("    ")];
        if runner.state() == RunnerState::WaitInput {
            let typing = focus == FocusTarget::Input(runner.id());
            controls.push(Span::styled(
                format!("{}: ", runner.prompt().unwrap_or_default()),
                Style::default().fg(Color::Cyan),
            ));
            controls.push(Span::raw(if typing { input.text.clone() } else { String::new() }));
            controls.push(Span::raw("  "));
        }
        for label in runner.controls() {
            controls.push(Span::styled(
                format!("[{label}] "),
                Style::default().fg(Color::Magenta),
            ));
        }
        lines.push(Line::from(controls));
    }
    lines
}

fn draw_editor(area: Rect, f: &mut ratatui::Frame, state: &UiState, focused: bool) {
    let border = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title("?-");
    if let Some(hover) = state.hover_text.as_deref() {
        block = block.title_bottom(Line::from(Span::styled(
            format!(" {hover} "),
            Style::default().fg(Color::Cyan),
        )));
    }

    let width = area.width.saturating_sub(2) as usize;
    let cursor_col = state.editor.text[..state.editor.cursor].chars().count();
    let skip = cursor_col.saturating_sub(width.saturating_sub(1));
    let visible: String = state.editor.text.chars().skip(skip).take(width).collect();
    f.render_widget(Paragraph::new(visible).block(block), area);

    if focused {
        f.set_cursor_position((area.x + 1 + (cursor_col - skip) as u16, area.y + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeJobClient;
    use crate::model::{Answer, JobEvent, Query, RunnerId};

    fn cfg() -> RunConfig {
        RunConfig {
            server: "http://localhost:3050".into(),
            application: "swish".into(),
            source: None,
            queries: Vec::new(),
            iconify_previous: true,
            max_answers: 10,
            chunk: None,
            timeout: Duration::from_secs(5),
            user_agent: "test".into(),
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn title_shows_visible_rows_when_scrolled() {
        let (host, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut c = RunnerCollection::new(host, 4);
        let client = FakeJobClient::new();
        let id = c.run(&client, Query::new("a"));
        assert_eq!(runners_title(&c), "Runners (1 / 1 alive)");
        for _ in 0..5 {
            c.dispatch(
                id,
                JobEvent::Output {
                    text: "line".into(),
                    location: None,
                },
            );
        }
        assert_eq!(runners_title(&c), "Runners (1 / 1 alive) rows 4-7 of 7");
        c.scroll_by(-3);
        assert_eq!(runners_title(&c), "Runners (1 / 1 alive) rows 1-4 of 7");
    }

    #[test]
    fn editor_enter_runs_goal() {
        let mut s = UiState::default();
        for c in "member(X,[1,2])".chars() {
            handle_key(&mut s, FocusTarget::Editor, &cfg(), key(KeyCode::Char(c)));
        }
        let cmd = handle_key(&mut s, FocusTarget::Editor, &cfg(), key(KeyCode::Enter));
        assert_eq!(cmd, Some(UiCommand::Run(Query::new("member(X,[1,2])"))));
        assert!(s.editor.text.is_empty());
        assert_eq!(s.history, vec!["member(X,[1,2])"]);
        assert_eq!(
            handle_key(&mut s, FocusTarget::Editor, &cfg(), key(KeyCode::Enter)),
            None
        );
    }

    #[test]
    fn runner_keys_map_to_actions() {
        let mut s = UiState::default();
        let focus = FocusTarget::Runner(RunnerId(1));
        assert_eq!(
            handle_key(&mut s, focus, &cfg(), key(KeyCode::Char(';'))),
            Some(UiCommand::Focused(RunnerAction::Next))
        );
        assert_eq!(
            handle_key(&mut s, focus, &cfg(), key(KeyCode::Esc)),
            Some(UiCommand::Focused(RunnerAction::StopOrAbort))
        );
        assert_eq!(
            handle_key(&mut s, focus, &cfg(), key(KeyCode::Delete)),
            Some(UiCommand::Focused(RunnerAction::Close))
        );
        assert_eq!(
            handle_key(&mut s, focus, &cfg(), key(KeyCode::Char('x'))),
            Some(UiCommand::Focus(FocusTarget::Editor))
        );
        assert_eq!(s.editor.text, "x");
    }

    #[test]
    fn input_enter_sends_cleaned_response() {
        let mut s = UiState::default();
        let focus = FocusTarget::Input(RunnerId(2));
        for c in " 42. ".chars() {
            handle_key(&mut s, focus, &cfg(), key(KeyCode::Char(c)));
        }
        assert_eq!(
            handle_key(&mut s, focus, &cfg(), key(KeyCode::Enter)),
            Some(UiCommand::Runner(RunnerId(2), RunnerAction::Respond("42".into())))
        );
        assert!(s.input.text.is_empty());
        assert_eq!(handle_key(&mut s, focus, &cfg(), key(KeyCode::Enter)), None);
    }

    #[test]
    fn any_key_closes_help() {
        let mut s = UiState {
            help: Some(HELP_TOPIC.into()),
            ..Default::default()
        };
        let cmd = handle_key(
            &mut s,
            FocusTarget::Editor,
            &cfg(),
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        );
        assert_eq!(cmd, None);
        assert!(s.help.is_none());
    }

    #[test]
    fn member_lines_match_display_lines() {
        let (host, _rx) = mpsc::unbounded_channel();
        let mut c = RunnerCollection::new(host, 10);
        let client = FakeJobClient::new();
        let id = c.run(&client, Query::new("member(X,[1,2])"));
        c.dispatch(
            id,
            JobEvent::Output {
                text: String::new(),
                location: None,
            },
        );
        c.dispatch(
            id,
            JobEvent::Success {
                answers: vec![Answer {
                    bindings: vec![("X".into(), "1".into()), ("Y".into(), "2".into())],
                }],
                more: true,
            },
        );
        let input = LineEdit::default();
        for m in c.members() {
            assert_eq!(
                member_lines(m, c.focus(), &input).len(),
                m.runner.display_lines(m.iconified)
            );
        }
        c.collapse_all();
        let m = &c.members()[0];
        assert_eq!(member_lines(m, c.focus(), &input).len(), 1);
    }
}
