// Handles the rendering of widgets to the terminal frame.

use super::forms::Widget;
use super::model::{NoticeLevel, Notification, ServiceId};
use super::services::Action;
use super::{App, Mode, Panel};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};

pub fn render(f: &mut Frame, app: &mut App) {
    let App {
        panels,
        tab,
        mode,
        notification,
        ..
    } = app;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(8),
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_tabs(f, chunks[0], panels, *tab);

    let panel = &mut panels[*tab];
    render_status(f, chunks[1], panel);
    render_fields(f, chunks[2], panel);
    render_notification(f, chunks[3], notification.as_ref());
    render_footer(f, chunks[4], mode, panel);

    match mode {
        Mode::Normal => {}
        Mode::Edit { buffer } => render_edit(f, panel, buffer),
        Mode::Menu { actions, state } => render_menu(f, actions, state),
        Mode::Confirm { action } => render_confirm(f, action.confirm.unwrap_or("Continue?")),
        Mode::Logs => render_logs(f, panel),
        Mode::Output { title, text } => render_output(f, title, text),
        Mode::Busy { message } => render_busy(f, message),
    }
}

fn render_tabs(f: &mut Frame, area: Rect, panels: &[Panel], selected: usize) {
    let titles: Vec<Line> = panels
        .iter()
        .map(|p| {
            let marker = if p.status.running {
                Span::styled("● ", Style::default().fg(Color::Green))
            } else if p.status.installed {
                Span::styled("○ ", Style::default().fg(Color::DarkGray))
            } else {
                Span::styled("· ", Style::default().fg(Color::DarkGray))
            };
            Line::from(vec![marker, Span::raw(p.spec.title)])
        })
        .collect();

    let tabs = Tabs::new(titles)
        .select(selected)
        .block(Block::default().borders(Borders::ALL).title(" Services "))
        .highlight_style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan));

    f.render_widget(tabs, area);
}

fn status_line(label: &str, value: Span<'static>) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<14}", label), Style::default().fg(Color::Gray)),
        value,
    ])
}

fn render_status(f: &mut Frame, area: Rect, panel: &Panel) {
    let status = &panel.status;
    let mut lines: Vec<Line> = Vec::new();

    let state_span = if panel.spec.id == ServiceId::Plex && !status.installed {
        Span::styled(
            "Not Installed - Please Run Update",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )
    } else if panel.spec.id == ServiceId::Plex && !status.browser_root_exists {
        Span::styled(
            "Error: Browser Root directory not found. Please mount your drive.",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )
    } else if !status.installed {
        Span::styled("Not Installed", Style::default().fg(Color::Red))
    } else if status.running {
        Span::styled(
            "Installed (Running)",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled(
            "Installed (Stopped)",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )
    };
    lines.push(status_line("Status", state_span));

    // Persisted intent next to observed state, so a divergence between
    // the two is visible at a glance.
    let enabled_key = if panel.spec.id == ServiceId::Tailscale {
        "enable"
    } else {
        "enabled"
    };
    let autostart = panel.cfg.get(panel.spec.section, enabled_key).unwrap_or("0");
    lines.push(status_line(
        "Autostart",
        if autostart == "1" {
            Span::styled("enabled (config)", Style::default().fg(Color::Green))
        } else {
            Span::styled("disabled (config)", Style::default().fg(Color::DarkGray))
        },
    ));

    if panel.spec.id == ServiceId::Plex && status.browser_root_exists {
        let configured = panel.configured_owner();
        let observed = status.observed_owner.clone().unwrap_or_else(|| "0:0".into());
        let span = if status.owner_mismatch(&configured) {
            Span::styled(
                format!(
                    "Mismatch! Root is owned by {}, configured for {}",
                    observed, configured
                ),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )
        } else {
            Span::styled(format!("Correct ({})", observed), Style::default().fg(Color::Green))
        };
        lines.push(status_line("Permissions", span));
    }
    if let Some(version) = &status.version {
        lines.push(status_line(
            "Version",
            Span::styled(version.clone(), Style::default().fg(Color::Blue)),
        ));
    }
    if let Some(url) = &status.web_url {
        lines.push(status_line("Web Interface", Span::raw(url.clone())));
    }
    if let Some(addr) = &status.address {
        lines.push(status_line("Tailscale IP", Span::raw(addr.clone())));
    }
    if let Some(auth) = &status.auth_url {
        lines.push(status_line(
            "Auth Required",
            Span::styled(auth.clone(), Style::default().fg(Color::Yellow)),
        ));
    }
    if let Some(text) = &status.status_text {
        if let Some(first) = text.lines().next() {
            lines.push(status_line("Backend", Span::raw(first.to_string())));
        }
    }

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Information "));
    f.render_widget(paragraph, area);
}

fn render_fields(f: &mut Frame, area: Rect, panel: &mut Panel) {
    let items: Vec<ListItem> = panel
        .rows
        .iter()
        .map(|row| {
            let label = match row.network {
                Some(n) => format!("Network {} · {}", n + 1, row.spec.label),
                None => row.spec.label.to_string(),
            };
            let dirty = if row.dirty { "*" } else { " " };

            let value_span = match row.spec.widget {
                Widget::Flag => {
                    if row.value == "1" {
                        Span::styled("[x]", Style::default().fg(Color::Green))
                    } else {
                        Span::styled("[ ]", Style::default().fg(Color::DarkGray))
                    }
                }
                Widget::Password if !row.value.is_empty() => Span::raw("••••••••"),
                _ if row.value.is_empty() && !row.spec.placeholder.is_empty() => Span::styled(
                    format!("({})", row.spec.placeholder),
                    Style::default().fg(Color::DarkGray),
                ),
                _ => Span::raw(row.value.clone()),
            };

            let mut spans = vec![
                Span::styled(dirty.to_string(), Style::default().fg(Color::Yellow)),
                Span::raw(format!("{:<32}", label)),
                value_span,
            ];
            if let Some(err) = &row.error {
                spans.push(Span::styled(
                    format!("  ✖ {}", err),
                    Style::default().fg(Color::Red),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" /etc/config/{} ", panel.spec.config_name)),
        )
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, &mut panel.list_state);
}

fn render_notification(f: &mut Frame, area: Rect, notification: Option<&Notification>) {
    let Some(notice) = notification else {
        return;
    };
    let style = match notice.level {
        NoticeLevel::Info => Style::default().fg(Color::Green),
        NoticeLevel::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    };
    f.render_widget(
        Paragraph::new(Span::styled(notice.text.clone(), style)),
        area,
    );
}

fn render_footer(f: &mut Frame, area: Rect, mode: &Mode, panel: &Panel) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let help_text = match mode {
        Mode::Logs => Line::from(vec![
            Span::raw("Scroll: "),
            Span::styled("j/k ", bold),
            Span::raw("| Auto-Scroll: "),
            Span::styled("G ", bold),
            Span::raw("| Close: "),
            Span::styled("Esc/q/l ", Style::default().fg(Color::Red)),
        ]),
        Mode::Edit { .. } => Line::from(vec![
            Span::raw("Apply: "),
            Span::styled("Enter ", bold),
            Span::raw("| Cancel: "),
            Span::styled("Esc ", Style::default().fg(Color::Red)),
        ]),
        Mode::Menu { .. } => Line::from(vec![
            Span::raw("Select: "),
            Span::styled("j/k ", bold),
            Span::raw("| Run: "),
            Span::styled("Enter ", bold),
            Span::raw("| Close: "),
            Span::styled("Esc ", Style::default().fg(Color::Red)),
        ]),
        Mode::Confirm { .. } => Line::from(vec![
            Span::raw("Confirm: "),
            Span::styled("y ", bold),
            Span::raw("| Cancel: "),
            Span::styled("any other key ", Style::default().fg(Color::Red)),
        ]),
        _ => {
            let mut spans = vec![
                Span::raw("Nav: "),
                Span::styled("Tab j/k ", bold),
                Span::raw("| Edit: "),
                Span::styled("Enter ", bold),
                Span::raw("| Save: "),
                Span::styled("w ", bold),
                Span::raw("| Actions: "),
                Span::styled("a ", Style::default().fg(Color::Cyan)),
                Span::raw("| Logs: "),
                Span::styled("l ", bold),
            ];
            if !panel.spec.network_type.is_empty() {
                spans.push(Span::raw("| Net: "));
                spans.push(Span::styled("n(add) d(del) ", bold));
            }
            spans.push(Span::raw("| Quit: "));
            spans.push(Span::styled("q", Style::default().fg(Color::Red)));
            Line::from(spans)
        }
    };

    let paragraph =
        Paragraph::new(help_text).block(Block::default().borders(Borders::ALL).title(" Controls "));
    f.render_widget(paragraph, area);
}

fn render_edit(f: &mut Frame, panel: &Panel, buffer: &str) {
    let title = panel
        .selected_row()
        .map(|r| format!(" {} ", r.spec.label))
        .unwrap_or_else(|| " Edit ".to_string());
    let help = panel
        .selected_row()
        .map(|r| r.spec.help)
        .unwrap_or_default();

    let area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, area);

    let mut lines = vec![Line::from(vec![
        Span::raw(buffer.to_string()),
        Span::styled("█", Style::default().fg(Color::Gray)),
    ])];
    if !help.is_empty() {
        lines.push(Line::from(Span::styled(
            help,
            Style::default().fg(Color::DarkGray),
        )));
    }

    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(paragraph, area);
}

fn render_menu(f: &mut Frame, actions: &[Action], state: &mut ListState) {
    let area = centered_rect(40, 40, f.area());
    f.render_widget(Clear, area);

    let items: Vec<ListItem> = actions
        .iter()
        .map(|a| {
            let style = if a.confirm.is_some() {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            ListItem::new(Span::styled(a.label, style))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Actions "))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, state);
}

fn render_confirm(f: &mut Frame, prompt: &str) {
    let area = centered_rect(60, 25, f.area());
    f.render_widget(Clear, area);

    let paragraph = Paragraph::new(prompt)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Are you sure? ")
                .border_style(Style::default().fg(Color::Red)),
        );
    f.render_widget(paragraph, area);
}

fn render_logs(f: &mut Frame, panel: &Panel) {
    let area = centered_rect(80, 80, f.area());
    f.render_widget(Clear, area);

    let title = if panel.stick_to_bottom {
        " Service Logs (Live | Auto-scroll: ON) - Press 'j/k' to pause "
    } else {
        " Service Logs (Paused | Auto-scroll: OFF) - Press 'G' to resume "
    };

    let inner_height = area.height.saturating_sub(2);
    let scroll = if panel.stick_to_bottom {
        (panel.logs.len() as u16).saturating_sub(inner_height)
    } else {
        panel
            .log_scroll
            .min((panel.logs.len() as u16).saturating_sub(1))
    };

    let content: Vec<Line> = panel.logs.iter().map(|s| Line::from(s.as_str())).collect();
    let paragraph = Paragraph::new(content)
        .block(Block::default().borders(Borders::ALL).title(title))
        .scroll((scroll, 0));
    f.render_widget(paragraph, area);
}

fn render_output(f: &mut Frame, title: &str, text: &str) {
    let area = centered_rect(70, 60, f.area());
    f.render_widget(Clear, area);

    let content: Vec<Line> = text.lines().map(|s| Line::from(s.to_string())).collect();
    let paragraph = Paragraph::new(content)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} (press any key) ", title)),
        );
    f.render_widget(paragraph, area);
}

fn render_busy(f: &mut Frame, message: &str) {
    let area = centered_rect(50, 20, f.area());
    f.render_widget(Clear, area);

    let lines = vec![
        Line::from(Span::styled(
            message.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "This may take a while if downloading files.",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Processing "));
    f.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
