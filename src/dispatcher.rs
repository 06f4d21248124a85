//! The active-session state machine.
//!
//! The dispatcher is the only owner of "which session is active". It never
//! performs I/O itself: every intent is turned into [`Effect`]s that the main
//! loop hands to the terminal backend, the summarizer and the speech output.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::registry::{PollReport, SessionRegistry};
use crate::terminal::{SessionId, SessionStatus};
use crate::voice::VoiceIntent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryPurpose {
    /// The user asked for it
    OnDemand,
    /// A session settled into idle or waiting
    StatusChange,
    /// First look at a newly discovered session; stored, never spoken
    Initial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub id: SessionId,
    pub incarnation: u64,
    pub purpose: SummaryPurpose,
    /// Output snapshot to summarize
    pub output: String,
}

/// A finished summary, tagged with the request it answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryOutcome {
    pub id: SessionId,
    pub incarnation: u64,
    pub purpose: SummaryPurpose,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A short message for the status board footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

/// Side effects requested by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Bring a session's tab to the front
    Activate(SessionId),
    /// Type text into a session
    Inject { id: SessionId, text: String },
    Summarize(SummaryRequest),
    /// Drop in-flight summaries for sessions that went away
    CancelSummaries(Vec<SessionId>),
    Speak(String),
    Notify(Notice),
    /// Poll sessions now instead of waiting for the next tick
    Refresh,
    /// Put text on the system clipboard
    CopyToClipboard(String),
}

pub struct Dispatcher {
    active: Option<SessionId>,
    choice_template: String,
    /// Minimum gap between announcements per session; `None` disables them
    announce_interval: Option<Duration>,
    last_announced: HashMap<SessionId, Instant>,
    effects: Vec<Effect>,
}

impl Dispatcher {
    pub fn new(choice_template: impl Into<String>, announce_interval: Option<Duration>) -> Self {
        Self {
            active: None,
            choice_template: choice_template.into(),
            announce_interval,
            last_announced: HashMap::new(),
            effects: Vec::new(),
        }
    }

    pub fn active(&self) -> Option<SessionId> {
        self.active
    }

    /// Take pending effects (drains the queue)
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    fn feedback(&mut self, spoken: String, notice: Notice) {
        self.push(Effect::Speak(spoken));
        self.push(Effect::Notify(notice));
    }

    /// Reconcile the active session with the registry: adopt the first session
    /// when none is active, and move to the first session in display order
    /// when the active one disappears.
    pub fn sync(&mut self, registry: &SessionRegistry) {
        match self.active {
            Some(id) if registry.contains(id) => {}
            Some(id) => {
                self.active = registry.first_id();
                match self.active {
                    Some(next) => tracing::info!("Active session {} vanished, now {}", id, next),
                    None => tracing::info!("Active session {} vanished, none left", id),
                }
            }
            None => {
                self.active = registry.first_id();
                if let Some(first) = self.active {
                    tracing::info!("Active session is {}", first);
                }
            }
        }
    }

    /// React to a finished poll cycle
    pub fn on_poll(&mut self, report: &PollReport, registry: &SessionRegistry, now: Instant) {
        if !report.removed.is_empty() {
            for id in &report.removed {
                self.last_announced.remove(id);
            }
            self.push(Effect::CancelSummaries(report.removed.clone()));
        }

        self.sync(registry);

        for id in &report.added {
            let Some(session) = registry.get(*id) else {
                continue;
            };
            self.push(Effect::Summarize(SummaryRequest {
                id: session.id,
                incarnation: session.incarnation,
                purpose: SummaryPurpose::Initial,
                output: session.output.clone(),
            }));
        }

        let Some(interval) = self.announce_interval else {
            return;
        };

        for transition in &report.transitions {
            tracing::debug!(
                "{}: {} -> {} (output changed: {})",
                transition.id,
                transition.from.label(),
                transition.to.label(),
                transition.output_changed
            );
            let settled = matches!(transition.to, SessionStatus::Idle | SessionStatus::WaitingForInput);
            if !settled || report.added.contains(&transition.id) {
                continue;
            }
            let throttled = self
                .last_announced
                .get(&transition.id)
                .is_some_and(|last| now.saturating_duration_since(*last) < interval);
            if throttled {
                tracing::debug!("Announcement for {} throttled", transition.id);
                continue;
            }
            let Some(session) = registry.get(transition.id) else {
                continue;
            };

            self.last_announced.insert(transition.id, now);
            self.push(Effect::Summarize(SummaryRequest {
                id: session.id,
                incarnation: session.incarnation,
                purpose: SummaryPurpose::StatusChange,
                output: session.output.clone(),
            }));
        }
    }

    /// Apply one intent
    pub fn handle(&mut self, intent: VoiceIntent, registry: &SessionRegistry) {
        tracing::info!("Intent: {}", intent);
        self.sync(registry);

        match intent {
            VoiceIntent::SwitchNext => self.step(registry, 1),
            VoiceIntent::SwitchPrev => self.step(registry, -1),
            VoiceIntent::SwitchTab(n) => {
                let ids = registry.ordered_ids();
                match ids.get((n as usize).wrapping_sub(1)) {
                    Some(id) => self.switch_to(*id, registry),
                    None => self.invalid_target(format!("tab {n}"), ids.len()),
                }
            }
            VoiceIntent::SwitchWindow(n) => {
                let windows = registry.windows();
                let target = windows
                    .get((n as usize).wrapping_sub(1))
                    .and_then(|w| registry.ordered_ids().into_iter().find(|id| id.window == *w));
                match target {
                    Some(id) => self.switch_to(id, registry),
                    None => self.invalid_target(format!("window {n}"), windows.len()),
                }
            }
            VoiceIntent::Summarize => {
                let Some(session) = self.active.and_then(|id| registry.get(id)) else {
                    return self.no_active_session();
                };
                let request = SummaryRequest {
                    id: session.id,
                    incarnation: session.incarnation,
                    purpose: SummaryPurpose::OnDemand,
                    output: session.output.clone(),
                };
                self.push(Effect::Summarize(request));
                self.push(Effect::Notify(Notice::info("Summarizing...")));
            }
            VoiceIntent::SelectChoice(n) => {
                let Some(id) = self.active else {
                    return self.no_active_session();
                };
                let text = self.choice_template.replace("{n}", &n.to_string());
                self.push(Effect::Inject { id, text });
                self.feedback(format!("Selected option {n}"), Notice::success(format!("Selected option {n}")));
            }
            VoiceIntent::Refresh => {
                self.push(Effect::Refresh);
                self.push(Effect::Notify(Notice::info("Refreshing...")));
            }
            VoiceIntent::FreeText(text) => {
                if text.trim().is_empty() {
                    return;
                }
                let Some(id) = self.active else {
                    return self.no_active_session();
                };
                self.push(Effect::Inject { id, text: text.clone() });
                self.feedback("Sent".to_string(), Notice::success(format!("Sent: {text}")));
            }
        }
    }

    /// Bring the active session to the front without changing it
    pub fn focus_active(&mut self) {
        if let Some(id) = self.active {
            self.push(Effect::Activate(id));
        }
    }

    /// Deliver a finished summary. Summaries for sessions that are gone, or
    /// whose id now belongs to a newer session, are dropped.
    pub fn summary_ready(&mut self, outcome: SummaryOutcome, registry: &mut SessionRegistry) {
        let SummaryOutcome { id, incarnation, purpose, text } = outcome;

        if !registry.set_summary(id, incarnation, text.clone()) {
            tracing::debug!("Discarding summary for {} (session gone)", id);
            return;
        }

        match purpose {
            SummaryPurpose::OnDemand if self.active == Some(id) => {
                self.push(Effect::Speak(text));
                self.push(Effect::Notify(Notice::success("Reading summary")));
            }
            SummaryPurpose::OnDemand => {
                tracing::debug!("Summary for {} arrived after switching away; not spoken", id);
            }
            SummaryPurpose::Initial => {
                tracing::debug!("Initial summary stored for {}", id);
            }
            SummaryPurpose::StatusChange => {
                let position = registry.position(id).map(|p| p + 1).unwrap_or_default();
                self.push(Effect::Speak(format!("Tab {position}: {text}")));
            }
        }
    }

    fn step(&mut self, registry: &SessionRegistry, delta: isize) {
        let ids = registry.ordered_ids();
        if ids.is_empty() {
            return self.feedback("No sessions".to_string(), Notice::error("No sessions"));
        }

        let current = self
            .active
            .and_then(|id| ids.iter().position(|i| *i == id))
            .unwrap_or(0) as isize;
        let len = ids.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.switch_to(ids[next], registry);
    }

    fn switch_to(&mut self, id: SessionId, registry: &SessionRegistry) {
        self.active = Some(id);
        self.push(Effect::Activate(id));

        let position = registry.position(id).map(|p| p + 1).unwrap_or_default();
        let name = registry.get(id).map(|s| s.name.clone()).unwrap_or_default();
        self.feedback(
            format!("Switched to tab {position}"),
            Notice::success(format!("Switched to {name} ({id})")),
        );
    }

    fn invalid_target(&mut self, target: String, available: usize) {
        tracing::info!("Invalid voice target {} ({} available)", target, available);
        self.feedback(
            format!("There is no {target}"),
            Notice::error(format!("Invalid target: {target} ({available} available)")),
        );
    }

    fn no_active_session(&mut self) {
        self.feedback("No active session".to_string(), Notice::error("No active session"));
    }
}
