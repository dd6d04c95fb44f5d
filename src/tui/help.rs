use crate::runner::keys::BINDINGS;
use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

const GLOBAL_KEYS: &[(&str, &str)] = &[
    ("Enter", "Run the goal in the editor"),
    ("Up/Down", "Recall previous goals"),
    ("Tab/S-Tab", "Move focus between runners and editor"),
    ("PgUp/PgDn", "Scroll the runner area"),
    ("Ctrl-S", "Stop all runners"),
    ("Ctrl-O", "Collapse all runners"),
    ("Ctrl-E", "Expand all runners"),
    ("Ctrl-L", "Clear all runners"),
    ("Ctrl-C", "Quit"),
];

fn key_line(key: &str, label: &str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(label.to_string()),
    ])
}

pub fn help_lines(topic: &str) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from("Keybinds:")];
    lines.extend(GLOBAL_KEYS.iter().map(|(k, l)| key_line(k, l)));
    lines.push(Line::from(""));
    lines.push(Line::from("Focused runner:"));
    lines.extend(BINDINGS.iter().map(|(k, l)| key_line(k, l)));
    lines.push(Line::from(""));
    lines.push(Line::from("Waiting for input:"));
    lines.push(key_line("Enter", "Send the typed term"));
    lines.push(key_line("Esc", "Abort the query"));
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::raw("Topic: "),
        Span::styled(topic.to_string(), Style::default().fg(Color::Cyan)),
        Span::raw("   (any key closes)"),
    ]));
    lines
}

pub fn draw_help(area: Rect, f: &mut Frame, topic: &str) {
    let lines = help_lines(topic);
    let height = (lines.len() as u16 + 2).min(area.height);
    let width = 64.min(area.width);
    let popup = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(Clear, popup);
    f.render_widget(p, popup);
}
