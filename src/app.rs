use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use std::time::{Duration, Instant};

use crate::actions::Action;
use crate::config::{Config, ThemeConfig};
use crate::dispatcher::{Dispatcher, Effect, Notice, NoticeLevel};
use crate::registry::{Session, SessionRegistry};
use crate::terminal::{Classifier, SessionStatus};
use crate::voice::{Interpreter, VoiceIntent};

/// Resolved theme colors
pub struct Theme {
    pub bg: Color,
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub running: Color,
    pub waiting: Color,
    pub error: Color,
    pub idle: Color,
}

impl Theme {
    /// Build from `#rrggbb` strings. Unparseable entries keep the default color.
    pub fn from_config(config: &ThemeConfig) -> Self {
        let fallback = ThemeConfig::default();
        let color = |value: &str, default: &str| {
            parse_hex(value)
                .or_else(|| {
                    tracing::warn!("Invalid theme color '{}', using {}", value, default);
                    parse_hex(default)
                })
                .unwrap_or(Color::Reset)
        };

        Self {
            bg: color(&config.bg, &fallback.bg),
            fg: color(&config.fg, &fallback.fg),
            accent: color(&config.accent, &fallback.accent),
            dim: color(&config.dim, &fallback.dim),
            running: color(&config.running, &fallback.running),
            waiting: color(&config.waiting, &fallback.waiting),
            error: color(&config.error, &fallback.error),
            idle: color(&config.idle, &fallback.idle),
        }
    }

    fn status_color(&self, status: SessionStatus) -> Color {
        match status {
            SessionStatus::Running => self.running,
            SessionStatus::WaitingForInput => self.waiting,
            SessionStatus::Error => self.error,
            SessionStatus::Idle => self.idle,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::from_config(&ThemeConfig::default())
    }
}

fn parse_hex(value: &str) -> Option<Color> {
    let hex = value.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn status_glyph(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Running => "● ",
        SessionStatus::WaitingForInput => "? ",
        SessionStatus::Error => "✗ ",
        SessionStatus::Idle => "○ ",
    }
}

/// Input mode for the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing a phrase that is interpreted like a voice transcript
    Dictating,
}

/// Main application state
pub struct App {
    pub registry: SessionRegistry,
    pub dispatcher: Dispatcher,
    interpreter: Interpreter,
    /// Highlighted row; mirrors the active session
    pub list_state: ListState,
    /// Latest notice shown in the footer
    pub notice: Option<Notice>,
    pub theme: Theme,
    pub input_mode: InputMode,
    pub input_buffer: String,
    /// Backend name for the header
    pub backend_name: &'static str,
    pub voice_enabled: bool,
    pub remote_summaries: bool,
    /// Effects raised by the board itself rather than the dispatcher
    pending_effects: Vec<Effect>,
}

impl App {
    pub fn new(config: &Config, backend_name: &'static str) -> Self {
        let classifier = Classifier::new(&config.classifier);
        let announce_interval = config
            .summary
            .auto_announce
            .then(|| Duration::from_secs(config.summary.min_interval_secs));

        Self {
            registry: SessionRegistry::new(classifier, config.max_buffer_chars),
            dispatcher: Dispatcher::new(config.voice.choice_template.clone(), announce_interval),
            interpreter: Interpreter::new(&config.voice.vocabulary),
            list_state: ListState::default(),
            notice: None,
            theme: Theme::from_config(&config.theme),
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            backend_name,
            voice_enabled: false,
            remote_summaries: false,
            pending_effects: Vec::new(),
        }
    }

    /// The session the dispatcher considers active
    pub fn active_session(&self) -> Option<&Session> {
        self.dispatcher.active().and_then(|id| self.registry.get(id))
    }

    /// Take pending effects (drains the queue). Notices are kept for the
    /// footer; everything else is returned for the effect runner.
    pub fn take_pending_effects(&mut self) -> Vec<Effect> {
        let mut effects = std::mem::take(&mut self.pending_effects);
        effects.extend(self.dispatcher.take_effects());

        let mut runnable = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect {
                Effect::Notify(notice) => self.notice = Some(notice),
                other => runnable.push(other),
            }
        }
        runnable
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        let quit = match action {
            Action::KeyPress(key) => self.handle_key(key)?,
            Action::Polled(captures) => {
                let now = Instant::now();
                let report = self.registry.apply_poll(captures, now);
                self.dispatcher.on_poll(&report, &self.registry, now);
                false
            }
            Action::Transcript(transcript) => {
                self.apply_transcript(&transcript);
                false
            }
            Action::SummaryReady(outcome) => {
                self.dispatcher.summary_ready(outcome, &mut self.registry);
                false
            }
            Action::Error(msg) => {
                self.notice = Some(Notice::error(msg));
                false
            }
            Action::Quit => true,
        };

        self.sync_selection();
        Ok(quit)
    }

    fn apply_transcript(&mut self, transcript: &str) {
        let intent = self.interpreter.interpret(transcript);
        self.dispatcher.handle(intent, &self.registry);
    }

    fn sync_selection(&mut self) {
        let row = self
            .dispatcher
            .active()
            .and_then(|id| self.registry.position(id));
        self.list_state.select(row);
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Clear the notice on any key press
        if self.notice.is_some() && self.input_mode == InputMode::Normal {
            self.notice = None;
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Dictating => self.handle_dictating_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        let intent = match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => VoiceIntent::SwitchNext,
            KeyCode::Char('k') | KeyCode::Up => VoiceIntent::SwitchPrev,
            KeyCode::Char('J') => {
                self.move_active(1);
                return Ok(false);
            }
            KeyCode::Char('K') => {
                self.move_active(-1);
                return Ok(false);
            }
            KeyCode::Char(c @ '1'..='9') => VoiceIntent::SelectChoice(c as u32 - '0' as u32),
            KeyCode::Char('s') => VoiceIntent::Summarize,
            KeyCode::Char('r') => VoiceIntent::Refresh,
            KeyCode::Enter => {
                self.dispatcher.sync(&self.registry);
                self.dispatcher.focus_active();
                return Ok(false);
            }
            KeyCode::Char('v') => {
                self.input_mode = InputMode::Dictating;
                self.input_buffer.clear();
                return Ok(false);
            }
            KeyCode::Char('y') => {
                self.copy_summary();
                return Ok(false);
            }
            _ => return Ok(false),
        };

        self.dispatcher.handle(intent, &self.registry);
        Ok(false)
    }

    fn handle_dictating_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Enter => {
                let phrase = std::mem::take(&mut self.input_buffer);
                self.input_mode = InputMode::Normal;
                if !phrase.trim().is_empty() {
                    self.apply_transcript(&phrase);
                }
            }
            KeyCode::Esc => {
                self.input_buffer.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char(c) => self.input_buffer.push(c),
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            _ => {}
        }
        Ok(false)
    }

    /// Move the active session within the display order
    fn move_active(&mut self, delta: isize) {
        self.dispatcher.sync(&self.registry);
        let Some(id) = self.dispatcher.active() else {
            self.notice = Some(Notice::error("No sessions"));
            return;
        };
        if self.registry.move_session(id, delta) {
            let position = self.registry.position(id).map(|p| p + 1).unwrap_or_default();
            self.notice = Some(Notice::success(format!("Moved {} to tab {}", id, position)));
        }
    }

    fn copy_summary(&mut self) {
        let summary = self.active_session().and_then(|s| s.summary.clone());
        match summary {
            Some(text) => {
                self.pending_effects.push(Effect::CopyToClipboard(text));
                self.notice = Some(Notice::success("Summary copied to clipboard"));
            }
            None => self.notice = Some(Notice::error("No summary yet. Press 's' to summarize")),
        }
    }

    pub fn render(&mut self, frame: &mut Frame) {
        frame.render_widget(
            Block::default().style(Style::default().bg(self.theme.bg)),
            frame.area(),
        );

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Main content
                Constraint::Length(3), // Footer/status
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_main(frame, chunks[1]);
        self.render_footer(frame, chunks[2]);

        if self.input_mode == InputMode::Dictating {
            self.render_dictation_dialog(frame);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let on_off = |flag: bool| if flag { "on" } else { "off" };
        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " VoiceDeck ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(
                    "│ {} │ voice: {} │ summaries: {} │ {} sessions",
                    self.backend_name,
                    on_off(self.voice_enabled),
                    if self.remote_summaries { "remote" } else { "local" },
                    self.registry.len()
                ),
                Style::default().fg(self.theme.dim),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn render_main(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(35), // Session list
                Constraint::Percentage(65), // Detail pane
            ])
            .split(area);

        self.render_session_list(frame, chunks[0]);
        self.render_detail_pane(frame, chunks[1]);
    }

    fn render_session_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.registry.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No sessions found. Waiting for terminal tabs...",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            self.registry
                .sessions()
                .enumerate()
                .map(|(i, session)| {
                    let mut spans = vec![
                        Span::styled(
                            status_glyph(session.status),
                            Style::default().fg(self.theme.status_color(session.status)),
                        ),
                        Span::styled(format!("{}. ", i + 1), Style::default().fg(self.theme.dim)),
                        Span::styled(session.name.clone(), Style::default().fg(self.theme.fg)),
                        Span::styled(format!(" {}", session.id), Style::default().fg(self.theme.dim)),
                    ];
                    if session.stale {
                        spans.push(Span::styled(" (stale)", Style::default().fg(self.theme.error)));
                    }
                    ListItem::new(Line::from(spans))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Sessions ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn detail_lines(&self, session: &Session, output_lines: usize) -> Vec<Line<'static>> {
        let label = |text: &str| Span::styled(text.to_string(), Style::default().fg(self.theme.dim));
        let value = |text: String| Span::styled(text, Style::default().fg(self.theme.fg));

        let mut lines = vec![
            Line::from(vec![label("Name: "), value(session.name.clone())]),
            Line::from(vec![label("ID: "), value(session.id.to_string())]),
            Line::from(vec![
                label("Status: "),
                Span::styled(
                    session.status.label().to_string(),
                    Style::default()
                        .fg(self.theme.status_color(session.status))
                        .add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(vec![
                label("Updated: "),
                value(session.updated_at.format("%H:%M:%S").to_string()),
            ]),
        ];

        let hints = &session.hints;
        if let Some(progress) = hints.progress {
            lines.push(Line::from(vec![
                label("Tasks: "),
                value(format!("{}/{} completed", progress.completed, progress.total)),
            ]));
        }
        if !hints.todos.is_empty() {
            lines.push(Line::from(label("Todo:")));
            for todo in &hints.todos {
                lines.push(Line::from(value(format!("  ☐ {}", todo))));
            }
        }
        if !hints.choices.is_empty() {
            lines.push(Line::from(label("Choices (press 1-9):")));
            for choice in &hints.choices {
                lines.push(Line::from(Span::styled(
                    format!("  {}", choice),
                    Style::default().fg(self.theme.waiting),
                )));
            }
        }
        for error in &hints.error_lines {
            lines.push(Line::from(Span::styled(
                format!("! {}", error),
                Style::default().fg(self.theme.error),
            )));
        }

        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            label("Summary: "),
            match &session.summary {
                Some(summary) => value(summary.clone()),
                None => label("none yet"),
            },
        ]));

        lines.push(Line::from(""));
        lines.push(Line::from(label("Output:")));
        let tail: Vec<&str> = session.output.lines().collect();
        let start = tail.len().saturating_sub(output_lines);
        for line in &tail[start..] {
            lines.push(Line::from(Span::styled(
                line.to_string(),
                Style::default().fg(self.theme.fg),
            )));
        }

        lines
    }

    fn render_detail_pane(&self, frame: &mut Frame, area: Rect) {
        let content = match self.active_session() {
            Some(session) => {
                // Leave room for the fixed fields above the output tail
                let output_lines = (area.height as usize).saturating_sub(14).max(3);
                self.detail_lines(session, output_lines)
            }
            None => vec![
                Line::from(Span::styled(
                    "No active session",
                    Style::default().fg(self.theme.dim),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Sessions appear here once a matching terminal tab is open",
                    Style::default().fg(self.theme.dim),
                )),
            ],
        };

        let detail = Paragraph::new(content).wrap(Wrap { trim: false }).block(
            Block::default()
                .title(" Details ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(detail, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text = " q: Quit │ j/k: Switch │ J/K: Reorder │ 1-9: Choose │ Enter: Focus │ s: Summarize │ r: Refresh │ v: Dictate │ y: Copy summary ";

        let content = match &self.notice {
            Some(notice) => {
                let color = match notice.level {
                    NoticeLevel::Info => self.theme.accent,
                    NoticeLevel::Success => self.theme.running,
                    NoticeLevel::Error => self.theme.error,
                };
                Line::from(Span::styled(
                    format!(" {} ", notice.message),
                    Style::default().fg(color),
                ))
            }
            None => Line::from(Span::styled(help_text, Style::default().fg(self.theme.dim))),
        };

        let footer = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(footer, area);
    }

    fn render_dictation_dialog(&self, frame: &mut Frame) {
        let area = centered_rect(60, 20, frame.area());

        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(" Dictate ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.accent));

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                "Type a command or text to send:",
                Style::default().fg(self.theme.fg),
            )),
            Line::from(""),
            Line::from(Span::styled(
                format!("▶ {}_", self.input_buffer),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press Enter to apply, Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];

        let paragraph = Paragraph::new(text);
        frame.render_widget(paragraph, inner);
    }
}

/// Helper function to create a centered rectangle
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
