use crate::{
    config::AppConfig,
    filters::FilterToggle,
    plugin::{MessageType, PluginRecord},
    session::{LogLevel, Session, ToastLevel},
};
use anyhow::Result;
use arboard::Clipboard;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{
        Block, BorderType, Borders, Cell, Clear, Padding, Paragraph, Row, Table, TableState, Wrap,
    },
};
use std::{
    io,
    time::{Duration, Instant},
};

const DETAILS_WIDTH: u16 = 50;
const LOG_HEIGHT: u16 = 8;

/// Palette for the plugin view. Message kinds map onto `note`, `warn`
/// and `bad`.
struct Theme {
    note: Color,
    frame: Color,
    text: Color,
    muted: Color,
    good: Color,
    warn: Color,
    bad: Color,
    chrome_bg: Color,
    log_bg: Color,
}

impl Theme {
    fn new() -> Self {
        Self {
            note: Color::Rgb(110, 180, 235),
            frame: Color::Rgb(70, 78, 92),
            text: Color::Rgb(215, 222, 232),
            muted: Color::Rgb(128, 138, 150),
            good: Color::Rgb(130, 210, 150),
            warn: Color::Rgb(235, 190, 110),
            bad: Color::Rgb(230, 95, 90),
            chrome_bg: Color::Rgb(20, 25, 32),
            log_bg: Color::Rgb(14, 18, 23),
        }
    }

    fn panel(&self, title: impl Into<String>) -> Block<'static> {
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.frame))
            .title(Span::styled(title.into(), self.bold(self.note)))
            .padding(Padding::horizontal(1))
    }

    fn bold(&self, color: Color) -> Style {
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    }

    fn selected(&self) -> Style {
        Style::default()
            .bg(self.note)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    }

    fn message_color(&self, kind: MessageType) -> Color {
        match kind {
            MessageType::Note => self.note,
            MessageType::Warn => self.warn,
            MessageType::Error => self.bad,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputPurpose {
    ContentFilter,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputMode {
    Normal,
    Editing {
        prompt: String,
        buffer: String,
        purpose: InputPurpose,
    },
}

/// Terminal-only state that the session does not need to know about.
struct UiState {
    input_mode: InputMode,
    should_quit: bool,
    clipboard: Option<Clipboard>,
}

impl UiState {
    fn new() -> Self {
        Self {
            input_mode: InputMode::Normal,
            should_quit: false,
            clipboard: None,
        }
    }

    fn copy_to_clipboard(&mut self, session: &mut Session, text: &str) -> bool {
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(err) => {
                    session.status = format!("Clipboard unavailable: {err}");
                    session.log_warn(format!("Clipboard unavailable: {err}"));
                    return false;
                }
            }
        }
        let Some(clipboard) = self.clipboard.as_mut() else {
            return false;
        };
        if let Err(err) = clipboard.set_text(text.to_string()) {
            session.status = format!("Clipboard copy failed: {err}");
            session.log_warn(format!("Clipboard copy failed: {err}"));
            return false;
        }
        true
    }
}

pub fn run(session: &mut Session, config: &mut AppConfig) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut state = UiState::new();
    let result = run_loop(&mut terminal, session, &mut state);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    config.filters = session.filter_settings();
    config.save()?;
    result
}

fn run_loop(
    terminal: &mut Terminal<impl Backend>,
    session: &mut Session,
    state: &mut UiState,
) -> Result<()> {
    loop {
        session.tick();
        session.clamp_selection();
        terminal.draw(|frame| draw(frame, session, state))?;

        if state.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(session, state, key);
                }
            }
        }
    }

    Ok(())
}

fn handle_key(session: &mut Session, state: &mut UiState, key: KeyEvent) {
    let mode = std::mem::replace(&mut state.input_mode, InputMode::Normal);
    match mode {
        InputMode::Normal => handle_normal_mode(session, state, key),
        InputMode::Editing {
            prompt,
            mut buffer,
            purpose,
        } => handle_input_mode(session, state, key, prompt, &mut buffer, purpose),
    }
}

fn toggle_for_key(c: char) -> Option<FilterToggle> {
    let digit = c.to_digit(10)? as usize;
    if digit == 0 {
        return None;
    }
    FilterToggle::ALL.get(digit - 1).copied()
}

fn handle_normal_mode(session: &mut Session, state: &mut UiState, key: KeyEvent) {
    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
            state.should_quit = true;
        }
        (KeyCode::Up, _) | (KeyCode::Char('k'), _) => session.move_selection(-1),
        (KeyCode::Down, _) | (KeyCode::Char('j'), _) => session.move_selection(1),
        (KeyCode::Home, _) => session.selected = 0,
        (KeyCode::End, _) => session.selected = session.filtered.len().saturating_sub(1),
        (KeyCode::PageUp, _) => session.scroll_log_up(3),
        (KeyCode::PageDown, _) => session.scroll_log_down(3),
        (KeyCode::Char(c), _) if toggle_for_key(c).is_some() => {
            if let Some(toggle) = toggle_for_key(c) {
                session.flip_toggle(toggle);
            }
        }
        (KeyCode::Char('f'), _) => {
            state.input_mode = InputMode::Editing {
                prompt: "Content filter".to_string(),
                buffer: session.filters.content_filter.clone(),
                purpose: InputPurpose::ContentFilter,
            };
        }
        (KeyCode::Char('/'), _) => {
            state.input_mode = InputMode::Editing {
                prompt: "Search".to_string(),
                buffer: session.search_needle.clone(),
                purpose: InputPurpose::Search,
            };
        }
        (KeyCode::Char('n'), _) => session.select_next_search_result(),
        (KeyCode::Esc, _) => {
            if !session.search_needle.is_empty() {
                session.search("");
                session.status = "Search cleared".to_string();
            }
        }
        (KeyCode::Char('c'), _) => {
            let Some(name) = session.selected_plugin().map(|plugin| plugin.name.clone()) else {
                return;
            };
            if session.filters.conflict_plugin.as_deref() == Some(name.as_str()) {
                session.show_only_conflicts(None);
            } else {
                session.show_only_conflicts(Some(&name));
            }
        }
        (KeyCode::Char('C'), _) => session.show_only_conflicts(None),
        (KeyCode::Char('y'), _) => {
            let text = session.load_order_text();
            if state.copy_to_clipboard(session, &text) {
                let count = session.filtered.len();
                session.status = format!("Copied {count} plugin name(s)");
                session.set_toast("Load order copied", ToastLevel::Info, Duration::from_secs(2));
            }
        }
        (KeyCode::Char('Y'), _) => {
            let Some(plugin) = session.selected_plugin() else {
                return;
            };
            let name = plugin.name.clone();
            let text = session.metadata_text(plugin);
            if state.copy_to_clipboard(session, &text) {
                session.status = format!("Copied metadata for {name}");
                session.set_toast("Metadata copied", ToastLevel::Info, Duration::from_secs(2));
            }
        }
        _ => {}
    }
}

fn handle_input_mode(
    session: &mut Session,
    state: &mut UiState,
    key: KeyEvent,
    prompt: String,
    buffer: &mut String,
    purpose: InputPurpose,
) {
    match key.code {
        KeyCode::Esc => {
            let message = match purpose {
                InputPurpose::ContentFilter => "Filter edit cancelled",
                InputPurpose::Search => "Search cancelled",
            };
            session.set_toast(message, ToastLevel::Warn, Duration::from_secs(2));
            return;
        }
        KeyCode::Enter => {
            match purpose {
                InputPurpose::ContentFilter => session.set_content_filter(buffer),
                InputPurpose::Search => {
                    let matches = session.search(buffer.trim());
                    if !buffer.trim().is_empty() {
                        session.status = format!("{matches} search result(s)");
                        session.select_next_search_result();
                    }
                }
            }
            return;
        }
        KeyCode::Char(c) => {
            if key.modifiers.contains(KeyModifiers::CONTROL)
                || key.modifiers.contains(KeyModifiers::ALT)
            {
                return;
            }
            buffer.push(c);
        }
        KeyCode::Backspace => {
            buffer.pop();
        }
        _ => {}
    }

    state.input_mode = InputMode::Editing {
        prompt,
        buffer: buffer.clone(),
        purpose,
    };
}

fn draw(frame: &mut Frame<'_>, session: &Session, state: &UiState) {
    let area = frame.size();
    let theme = Theme::new();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(LOG_HEIGHT),
        ])
        .split(area);

    let header = Paragraph::new(header_lines(session, &theme))
        .style(Style::default().bg(theme.chrome_bg))
        .alignment(Alignment::Center);
    frame.render_widget(header, chunks[0]);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(30), Constraint::Length(DETAILS_WIDTH)])
        .split(chunks[1]);

    let list_title = match &session.filters.conflict_plugin {
        Some(plugin) => format!("Plugins (conflicts with {plugin})"),
        None => format!(
            "Plugins ({}/{})",
            session.filtered.len(),
            session.plugins.len()
        ),
    };
    let rows = build_rows(session, &theme);
    if rows.is_empty() {
        let message = if session.plugins.is_empty() {
            "No plugins loaded. Start with --snapshot <path>."
        } else {
            "No plugins pass the current filters."
        };
        let empty = Paragraph::new(message)
            .style(Style::default().fg(theme.muted))
            .block(theme.panel(list_title))
            .alignment(Alignment::Center);
        frame.render_widget(empty, body_chunks[0]);
    } else {
        let table = Table::new(
            rows,
            [
                Constraint::Length(1),
                Constraint::Length(6),
                Constraint::Min(16),
                Constraint::Length(10),
                Constraint::Length(8),
                Constraint::Length(4),
            ],
        )
        .header(
            Row::new(vec![
                Cell::from(""),
                Cell::from("Prio"),
                Cell::from("Plugin"),
                Cell::from("Version"),
                Cell::from("CRC"),
                Cell::from("Msg"),
            ])
            .style(Style::default().fg(theme.text).add_modifier(Modifier::BOLD)),
        )
        .column_spacing(1)
        .block(theme.panel(list_title))
        .highlight_style(theme.selected())
        .highlight_symbol(">");

        let mut table_state = TableState::default();
        table_state.select(Some(session.selected));
        frame.render_stateful_widget(table, body_chunks[0], &mut table_state);
    }

    let details = Paragraph::new(build_details(session, &theme))
        .style(Style::default().fg(theme.text))
        .block(theme.panel("Details"))
        .wrap(Wrap { trim: false });
    frame.render_widget(details, body_chunks[1]);

    let status_block = theme.panel("Status");
    let status_inner = status_block.inner(chunks[2]);
    let footer = Paragraph::new(status_bar_line(session, state, status_inner.width))
        .style(Style::default().fg(theme.text))
        .block(status_block);
    frame.render_widget(footer, chunks[2]);

    let log_block = theme.panel("Log").style(Style::default().bg(theme.log_bg));
    let log_inner = log_block.inner(chunks[3]);
    let log = Paragraph::new(build_log_lines(session, &theme, log_inner.height as usize))
        .style(Style::default().fg(theme.text).bg(theme.log_bg))
        .block(log_block);
    frame.render_widget(log, chunks[3]);

    draw_toast(frame, session, &theme, chunks[1]);
}

fn header_lines(session: &Session, theme: &Theme) -> Vec<Line<'static>> {
    let counters = &session.counters;
    let title = if session.title.is_empty() {
        "No game".to_string()
    } else {
        session.title.clone()
    };
    let stat = |label: &'static str, value: String, color: Color| {
        vec![
            Span::styled(label, Style::default().fg(theme.muted)),
            Span::styled(value, Style::default().fg(color).add_modifier(Modifier::BOLD)),
            Span::raw("   "),
        ]
    };

    let mut first = vec![
        Span::styled(
            "PluginDeck",
            Style::default()
                .fg(theme.note)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(title, Style::default().fg(theme.text)),
        Span::raw("   "),
    ];
    first.extend(stat(
        "Messages: ",
        format!(
            "{}/{}",
            counters.filtered_total_messages, counters.total_messages
        ),
        theme.text,
    ));
    first.extend(stat(
        "Warnings: ",
        counters.total_warnings.to_string(),
        if counters.total_warnings > 0 {
            theme.warn
        } else {
            theme.muted
        },
    ));
    first.extend(stat(
        "Errors: ",
        counters.total_errors.to_string(),
        if counters.total_errors > 0 {
            theme.bad
        } else {
            theme.muted
        },
    ));
    first.extend(stat(
        "Dirty: ",
        counters.dirty_plugin_count.to_string(),
        if counters.dirty_plugin_count > 0 {
            theme.warn
        } else {
            theme.muted
        },
    ));
    if let Some(progress) = &session.progress {
        first.push(Span::styled(
            progress.clone(),
            Style::default().fg(theme.warn),
        ));
    }

    let toggles = session.filter_settings();
    let mut second = Vec::new();
    for (index, toggle) in FilterToggle::ALL.iter().enumerate() {
        let on = toggles.get(*toggle);
        second.push(Span::styled(
            format!("{}:{}", index + 1, short_label(*toggle)),
            if on {
                Style::default()
                    .fg(theme.good)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.muted)
            },
        ));
        second.push(Span::raw("  "));
    }
    if !session.filters.content_filter.is_empty() {
        second.push(Span::styled("Filter: ", Style::default().fg(theme.muted)));
        second.push(Span::styled(
            session.filters.content_filter.clone(),
            Style::default().fg(theme.note),
        ));
    }

    vec![Line::from(first), Line::from(""), Line::from(second)]
}

fn short_label(toggle: FilterToggle) -> &'static str {
    match toggle {
        FilterToggle::HideMessageless => "msgless",
        FilterToggle::HideInactive => "inactive",
        FilterToggle::HideNotes => "notes",
        FilterToggle::HideDoNotClean => "noclean",
        FilterToggle::HideAllMessages => "allmsg",
        FilterToggle::HideVersions => "version",
        FilterToggle::HideCrcs => "crc",
        FilterToggle::HideBashTags => "tags",
    }
}

fn build_rows(session: &Session, theme: &Theme) -> Vec<Row<'static>> {
    session
        .filtered_plugins()
        .map(|plugin| row_for_plugin(plugin, theme))
        .collect()
}

fn row_for_plugin(plugin: &PluginRecord, theme: &Theme) -> Row<'static> {
    let name_style = if plugin.is_dirty() {
        Style::default().fg(theme.warn)
    } else if plugin.is_active {
        Style::default().fg(theme.text)
    } else {
        Style::default().fg(theme.muted)
    };
    let marker = if plugin.card.search_result {
        Cell::from("*").style(Style::default().fg(theme.note))
    } else {
        Cell::from(" ")
    };
    let version = if plugin.card.version_hidden {
        String::new()
    } else {
        plugin.version.clone()
    };
    let crc = if plugin.card.crc_hidden {
        String::new()
    } else {
        plugin.crc_display().to_string()
    };
    let shown = plugin
        .messages()
        .iter()
        .filter(|message| !message.hidden)
        .count();
    let worst = plugin
        .messages()
        .iter()
        .filter(|message| !message.hidden)
        .map(|message| message.kind)
        .max_by_key(|kind| match kind {
            MessageType::Note => 0,
            MessageType::Warn => 1,
            MessageType::Error => 2,
        });
    let message_style = match worst {
        Some(kind) => Style::default().fg(theme.message_color(kind)),
        None => Style::default().fg(theme.muted),
    };

    Row::new(vec![
        marker,
        Cell::from(plugin.priority_display().to_string()),
        Cell::from(plugin.name.clone()).style(name_style),
        Cell::from(version),
        Cell::from(crc),
        Cell::from(if shown == 0 {
            String::new()
        } else {
            shown.to_string()
        })
        .style(message_style),
    ])
}

fn build_details(session: &Session, theme: &Theme) -> Vec<Line<'static>> {
    let Some(plugin) = session.selected_plugin() else {
        return vec![Line::from(Span::styled(
            "No plugin selected.",
            Style::default().fg(theme.muted),
        ))];
    };

    let kv = |label: &'static str, value: String| {
        Line::from(vec![
            Span::styled(label, Style::default().fg(theme.muted)),
            Span::styled(value, Style::default().fg(theme.text)),
        ])
    };

    let mut lines = vec![Line::from(Span::styled(
        plugin.name.clone(),
        Style::default()
            .fg(theme.note)
            .add_modifier(Modifier::BOLD),
    ))];
    if !plugin.card.version_hidden && !plugin.version.is_empty() {
        lines.push(kv("Version: ", plugin.version.clone()));
    }
    if !plugin.card.crc_hidden && !plugin.crc_display().is_empty() {
        lines.push(kv("CRC: ", plugin.crc_display().to_string()));
    }
    if !plugin.priority_display().is_empty() {
        let scope = if plugin.is_global_priority {
            " (global)"
        } else {
            ""
        };
        lines.push(kv(
            "Priority: ",
            format!("{}{scope}", plugin.priority_display()),
        ));
    }

    let mut flags = Vec::new();
    if plugin.is_active {
        flags.push("Active");
    }
    if plugin.is_master {
        flags.push("Master");
    }
    if plugin.is_empty {
        flags.push("Empty");
    }
    if plugin.loads_bsa {
        flags.push("Loads BSA");
    }
    if plugin.has_user_edits() {
        flags.push("User metadata");
    }
    if !flags.is_empty() {
        lines.push(kv("Flags: ", flags.join(", ")));
    }
    if plugin.is_dirty() {
        lines.push(Line::from(Span::styled(
            "Contains dirty edits",
            Style::default().fg(theme.warn),
        )));
    }
    if !plugin.card.tags_hidden {
        if !plugin.tags_added().is_empty() {
            lines.push(kv("Tags added: ", plugin.tags_added().to_string()));
        }
        if !plugin.tags_removed().is_empty() {
            lines.push(kv("Tags removed: ", plugin.tags_removed().to_string()));
        }
    }

    if !plugin.messages().is_empty() {
        lines.push(Line::from(""));
    }
    for message in plugin.messages() {
        let label = match message.kind {
            MessageType::Note => "Note",
            MessageType::Warn => "Warn",
            MessageType::Error => "Error",
        };
        let (label_style, text_style) = if message.hidden {
            (
                Style::default().fg(theme.muted),
                Style::default()
                    .fg(theme.muted)
                    .add_modifier(Modifier::DIM),
            )
        } else {
            (
                Style::default()
                    .fg(theme.message_color(message.kind))
                    .add_modifier(Modifier::BOLD),
                Style::default().fg(theme.text),
            )
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{label}: "), label_style),
            Span::styled(message.content.clone(), text_style),
        ]));
    }

    lines
}

fn hint(session: &Session) -> &'static str {
    if session.filters.conflict_plugin.is_some() {
        "c/C clear conflicts | 1-8 toggles | f filter | / search | q quit"
    } else {
        "1-8 toggles | f filter | / search | c conflicts | y/Y copy | q quit"
    }
}

/// Status text on the left, key hints right-aligned. The hints are dropped
/// first when the line does not fit.
fn status_bar_line(session: &Session, state: &UiState, width: u16) -> String {
    let width = usize::from(width);
    let (left, right) = match &state.input_mode {
        InputMode::Normal => (format!("Status: {}", session.status), hint(session)),
        InputMode::Editing { prompt, buffer, .. } => {
            (format!("{prompt}: {buffer}"), "Enter confirm | Esc cancel")
        }
    };

    let left_len = left.chars().count();
    if left_len >= width {
        return left.chars().take(width).collect();
    }
    let gap = width - left_len;
    let right_len = right.chars().count();
    if right_len >= gap {
        return left;
    }
    format!("{left}{}{right}", " ".repeat(gap - right_len))
}

fn build_log_lines(session: &Session, theme: &Theme, height: usize) -> Vec<Line<'static>> {
    if height == 0 {
        return Vec::new();
    }
    if session.logs.is_empty() {
        return vec![Line::from(Span::styled(
            "Nothing logged yet.",
            Style::default().fg(theme.muted),
        ))];
    }

    let skip = session
        .log_scroll
        .min(session.logs.len().saturating_sub(height));
    let mut lines: Vec<Line<'static>> = session
        .logs
        .iter()
        .rev()
        .skip(skip)
        .take(height)
        .map(|entry| {
            let (tag, color) = match entry.level {
                LogLevel::Info => ("info ", theme.muted),
                LogLevel::Warn => ("warn ", theme.warn),
                LogLevel::Error => ("error", theme.bad),
            };
            Line::from(vec![
                Span::styled(tag, theme.bold(color)),
                Span::raw(" "),
                Span::styled(entry.message.clone(), Style::default().fg(theme.text)),
            ])
        })
        .collect();
    lines.reverse();
    lines
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    clipped.push_str("...");
    clipped
}

fn draw_toast(frame: &mut Frame<'_>, session: &Session, theme: &Theme, body_area: Rect) {
    let Some(toast) = session.toast.as_ref() else {
        return;
    };
    if toast.expires_at <= Instant::now() {
        return;
    }

    let max_width = body_area.width.saturating_sub(4).max(24);
    let message = clip(&toast.message, usize::from(max_width.saturating_sub(4)));
    let text_width = u16::try_from(message.chars().count()).unwrap_or(max_width);
    let width = text_width.saturating_add(4).clamp(24, max_width);
    let x = body_area.x + (body_area.width.saturating_sub(width)) / 2;
    let toast_area = Rect::new(x, body_area.y + 1, width, 3).intersection(body_area);

    let border = match toast.level {
        ToastLevel::Info => theme.note,
        ToastLevel::Warn => theme.warn,
        ToastLevel::Error => theme.bad,
    };

    frame.render_widget(Clear, toast_area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(theme.chrome_bg));
    let content = Paragraph::new(message)
        .block(block)
        .style(Style::default().fg(theme.text))
        .alignment(Alignment::Center);
    frame.render_widget(content, toast_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflicts::UnavailableEngine;
    use std::sync::Arc;

    fn session() -> Session {
        Session::new(Arc::new(UnavailableEngine), &AppConfig::default())
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn digit_keys_map_to_toggles_in_order() {
        assert_eq!(toggle_for_key('1'), Some(FilterToggle::HideMessageless));
        assert_eq!(toggle_for_key('8'), Some(FilterToggle::HideBashTags));
        assert_eq!(toggle_for_key('0'), None);
        assert_eq!(toggle_for_key('9'), None);
        assert_eq!(toggle_for_key('x'), None);
    }

    #[test]
    fn typing_a_filter_applies_on_enter() {
        let mut session = session();
        let mut state = UiState::new();
        handle_key(&mut session, &mut state, press(KeyCode::Char('f')));
        for c in "usleep".chars() {
            handle_key(&mut session, &mut state, press(KeyCode::Char(c)));
        }
        handle_key(&mut session, &mut state, press(KeyCode::Backspace));
        assert!(matches!(
            &state.input_mode,
            InputMode::Editing { buffer, .. } if buffer == "uslee"
        ));
        handle_key(&mut session, &mut state, press(KeyCode::Enter));
        assert_eq!(state.input_mode, InputMode::Normal);
        assert_eq!(session.filters.content_filter, "uslee");
    }

    #[test]
    fn escape_abandons_edit() {
        let mut session = session();
        let mut state = UiState::new();
        handle_key(&mut session, &mut state, press(KeyCode::Char('/')));
        handle_key(&mut session, &mut state, press(KeyCode::Char('a')));
        handle_key(&mut session, &mut state, press(KeyCode::Esc));
        assert_eq!(state.input_mode, InputMode::Normal);
        assert!(session.search_needle.is_empty());
    }

    #[test]
    fn status_bar_clips_wide_text_by_chars() {
        let mut session = session();
        session.status = "Überprüfung läuft für Ñandú.esp".to_string();
        let state = UiState::new();
        let line = status_bar_line(&session, &state, 12);
        assert_eq!(line.chars().count(), 12);
        assert_eq!(line, "Status: Über");
        assert_eq!(clip("Ñandú Ñandú", 8), "Ñandú...");
        assert_eq!(clip("short", 8), "short");
    }

    #[test]
    fn status_bar_pads_to_width() {
        let mut session = session();
        session.status = "Ready".to_string();
        let state = UiState::new();
        let line = status_bar_line(&session, &state, 120);
        assert_eq!(line.len(), 120);
        assert!(line.starts_with("Status: Ready"));
        assert!(line.ends_with("q quit"));
        assert_eq!(status_bar_line(&session, &state, 0), "");
    }
}
