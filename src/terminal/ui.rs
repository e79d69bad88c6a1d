use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::daemon::notifier::Toast;
use crate::format::{format_remaining, format_size};
use crate::mail::decoders::render_body;
use crate::store::lifecycle::{EmailStore, time_remaining};
use crate::store::repo::LocalStorage;
use crate::terminal::state::{AppState, Focus, PolicyChoice, PolicyDialog};

fn border(active: bool) -> Style {
    if active {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

pub fn render<S: LocalStorage>(
    f: &mut Frame,
    state: &AppState,
    store: &EmailStore<S>,
    toasts: &[Toast],
    now: i64,
) {
    let [main, toast_area, footer] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(toasts.len() as u16),
        Constraint::Length(1),
    ])
    .areas(f.area());

    let [left, right] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)])
            .margin(1)
            .areas(main);

    render_history(f, left, state, store, now);
    if state.opened.is_some() {
        render_message(f, right, state);
    } else {
        render_inbox(f, right, state);
    }

    let lines: Vec<Line> = toasts
        .iter()
        .map(|t| Line::from(Span::styled(t.text.clone(), Style::default().fg(Color::Magenta))))
        .collect();
    f.render_widget(Paragraph::new(lines), toast_area);

    let key = |k: &'static str| Span::styled(k, Style::default().add_modifier(Modifier::BOLD));
    let hint = Paragraph::new(Line::from(vec![
        key("g"),
        Span::raw(" generate  "),
        key("Enter"),
        Span::raw(" select/open  "),
        key("c"),
        Span::raw(" check mail  "),
        key("d"),
        Span::raw(" delete  "),
        key("C"),
        Span::raw(" clear all  "),
        key("o/1-9"),
        Span::raw(" attachment  "),
        key("q"),
        Span::raw(" quit"),
    ]));
    f.render_widget(hint, footer);

    if let Some(dialog) = &state.dialog {
        render_dialog(f, dialog);
    }
}

fn render_history<S: LocalStorage>(
    f: &mut Frame,
    area: Rect,
    state: &AppState,
    store: &EmailStore<S>,
    now: i64,
) {
    let block = Block::default()
        .title(format!(" Addresses ({}) ", store.len()))
        .borders(Borders::ALL)
        .border_style(border(state.focus == Focus::History));

    let items: Vec<ListItem> = store
        .entries()
        .iter()
        .map(|e| {
            let remaining = time_remaining(e, now);
            let marker = if store.selected() == Some(e.address.as_str()) {
                "● "
            } else {
                "  "
            };
            let left_style = if remaining.is_expired() {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Gray)
            };
            ListItem::new(Text::from(vec![
                Line::from(vec![
                    Span::raw(marker),
                    Span::styled(
                        e.address.clone(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                ]),
                Line::from(vec![
                    Span::raw("  "),
                    Span::styled(format_remaining(remaining), left_style),
                    Span::styled(
                        format!(" · {} msg", e.message_count),
                        Style::default().fg(Color::Gray),
                    ),
                ]),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_symbol("➜ ")
        .highlight_style(Style::default().fg(Color::Green));

    f.render_stateful_widget(list, area, &mut state.history.clone());
}

fn render_inbox(f: &mut Frame, area: Rect, state: &AppState) {
    let busy = state.checking || state.opening.is_some();
    let title = match (&state.inbox_of, busy) {
        (Some(a), true) => format!(" {a} (checking…) "),
        (Some(a), false) => format!(" {a} "),
        (None, true) => " Inbox (checking…) ".to_string(),
        (None, false) => " Inbox ".to_string(),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border(state.focus == Focus::Inbox));

    if state.messages.is_empty() {
        let hint = if state.inbox_of.is_some() {
            "No messages yet. Press c to check now."
        } else {
            "Select an address, or press g to generate one."
        };
        f.render_widget(Paragraph::new(hint).block(block), area);
        return;
    }

    let items: Vec<ListItem> = state
        .messages
        .iter()
        .map(|m| {
            ListItem::new(Text::from(vec![
                Line::from(Span::styled(
                    m.subject.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    format!("{} · {}", m.from, m.date),
                    Style::default().fg(Color::Gray),
                )),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_symbol("➜ ")
        .highlight_style(Style::default().fg(Color::Green));

    f.render_stateful_widget(list, area, &mut state.inbox.clone());
}

fn render_message(f: &mut Frame, area: Rect, state: &AppState) {
    let Some(msg) = &state.opened else {
        return;
    };
    let block = Block::default()
        .title(" Message ")
        .borders(Borders::ALL)
        .border_style(border(state.focus == Focus::Message));

    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![
        Line::from(vec![Span::styled("From: ", bold), Span::raw(msg.from.clone())]),
        Line::from(vec![Span::styled("Subject: ", bold), Span::raw(msg.subject.clone())]),
        Line::from(vec![Span::styled("Date: ", bold), Span::raw(msg.date.clone())]),
    ];
    for (i, att) in msg.attachments.iter().enumerate() {
        lines.push(Line::from(vec![
            Span::styled(format!("[{}] ", i + 1), Style::default().fg(Color::Cyan)),
            Span::raw(format!("{} ({})", att.filename, format_size(att.size))),
        ]));
    }
    lines.push(Line::raw(""));

    let width = area.width.saturating_sub(2) as usize;
    lines.extend(render_body(msg, width).lines().map(|l| Line::raw(l.to_string())));

    let p = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((state.body_scroll, 0));
    f.render_widget(p, area);
}

fn render_dialog(f: &mut Frame, dialog: &PolicyDialog) {
    let area = centered(f.area(), 50, dialog.choices.len() as u16 + 8);
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(format!(" Keep {} for… ", dialog.address))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let mut lines: Vec<Line> = dialog
        .choices
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let label = match c {
                PolicyChoice::Preset(h) if *h >= 24.0 => plural(h / 24.0, "day"),
                PolicyChoice::Preset(h) => plural(*h, "hour"),
                PolicyChoice::Never => "Manual deletion only".to_string(),
                PolicyChoice::Custom => format!(
                    "Custom: {}▏ {} (←/→)",
                    dialog.custom_input,
                    dialog.unit.label()
                ),
            };
            if i == dialog.index {
                Line::from(Span::styled(
                    format!("➜ {label}"),
                    Style::default().fg(Color::Green),
                ))
            } else {
                Line::raw(format!("  {label}"))
            }
        })
        .collect();

    lines.push(Line::raw(""));
    if let Some(err) = &dialog.error {
        lines.push(Line::from(Span::styled(
            err.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    lines.push(Line::from(Span::styled(
        "Enter confirm · Esc cancel",
        Style::default().fg(Color::Gray),
    )));

    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn plural(n: f64, unit: &str) -> String {
    if n == 1.0 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let [v] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [h] = Layout::horizontal([Constraint::Length(width.max(30))])
        .flex(Flex::Center)
        .areas(v);
    h
}
