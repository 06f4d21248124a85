//! Owns every monitored session and its latest captured state.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::terminal::{
    AutomationError, Classifier, Hints, SessionBackend, SessionId, SessionInfo, SessionStatus,
};

/// Characters compared between polls to decide whether output changed.
/// Comparing only the tail ignores scrollback shifting at the top.
const CHANGE_WINDOW_CHARS: usize = 1000;

/// Result of reading one tab during a poll
#[derive(Debug, Clone)]
pub struct Capture {
    pub info: SessionInfo,
    /// `None` when the tab was listed but its contents could not be read
    pub output: Option<String>,
}

/// A monitored terminal context
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    /// Last `max_buffer_chars` characters of output
    pub output: String,
    pub status: SessionStatus,
    pub hints: Hints,
    pub updated_at: DateTime<Local>,
    /// Distinguishes successive sessions that reuse the same id
    pub incarnation: u64,
    /// Latest summary delivered for this session
    pub summary: Option<String>,
    /// The last read failed; output is from an earlier poll
    pub stale: bool,
    last_changed: Instant,
}

impl Session {
    pub fn quiet_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_changed)
    }
}

/// A status change observed during a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub id: SessionId,
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub output_changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub added: Vec<SessionId>,
    pub removed: Vec<SessionId>,
    pub transitions: Vec<Transition>,
}

pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
    /// Display order. New sessions are appended; the user may reorder.
    order: Vec<SessionId>,
    classifier: Classifier,
    max_buffer_chars: usize,
    next_incarnation: u64,
}

impl SessionRegistry {
    pub fn new(classifier: Classifier, max_buffer_chars: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            order: Vec::new(),
            classifier,
            max_buffer_chars: max_buffer_chars.max(1),
            next_incarnation: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Sessions in display order
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }

    pub fn ordered_ids(&self) -> Vec<SessionId> {
        self.order.clone()
    }

    pub fn first_id(&self) -> Option<SessionId> {
        self.order.first().copied()
    }

    /// 0-based position of `id` in display order
    pub fn position(&self, id: SessionId) -> Option<usize> {
        self.order.iter().position(|k| *k == id)
    }

    /// Distinct windows, in the order their first tab is displayed
    pub fn windows(&self) -> Vec<u32> {
        let mut windows: Vec<u32> = Vec::new();
        for id in &self.order {
            if !windows.contains(&id.window) {
                windows.push(id.window);
            }
        }
        windows
    }

    /// Move a session `delta` places in display order, clamped to the ends.
    /// Returns whether it moved.
    pub fn move_session(&mut self, id: SessionId, delta: isize) -> bool {
        let Some(from) = self.position(id) else {
            return false;
        };
        let last = self.order.len() as isize - 1;
        let to = (from as isize + delta).clamp(0, last) as usize;
        if to == from {
            return false;
        }
        let id = self.order.remove(from);
        self.order.insert(to, id);
        true
    }

    /// Merge one poll cycle: add new tabs, drop vanished ones, refresh the rest.
    pub fn apply_poll(&mut self, captures: Vec<Capture>, now: Instant) -> PollReport {
        let mut report = PollReport::default();

        let seen: Vec<SessionId> = captures.iter().map(|c| c.info.id).collect();
        let vanished: Vec<SessionId> = self
            .sessions
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        for id in vanished {
            self.sessions.remove(&id);
            self.order.retain(|k| *k != id);
            tracing::info!("Session {} disappeared", id);
            report.removed.push(id);
        }

        for capture in captures {
            let id = capture.info.id;
            let name = capture.info.display_name();

            match self.sessions.get_mut(&id) {
                Some(session) => {
                    session.name = name;
                    let Some(output) = capture.output else {
                        session.stale = true;
                        continue;
                    };
                    let output = tail_chars(&output, self.max_buffer_chars).to_string();
                    let output_changed = tail_chars(&output, CHANGE_WINDOW_CHARS)
                        != tail_chars(&session.output, CHANGE_WINDOW_CHARS);
                    if output_changed {
                        session.last_changed = now;
                    }

                    let classification = self.classifier.classify(&output, session.quiet_for(now));
                    let from = session.status;

                    session.output = output;
                    session.status = classification.status;
                    session.hints = classification.hints;
                    session.updated_at = Local::now();
                    session.stale = false;

                    if from != session.status {
                        report.transitions.push(Transition {
                            id,
                            from,
                            to: session.status,
                            output_changed,
                        });
                    }
                }
                None => {
                    let stale = capture.output.is_none();
                    let output = capture
                        .output
                        .map(|o| tail_chars(&o, self.max_buffer_chars).to_string())
                        .unwrap_or_default();
                    let classification = self.classifier.classify(&output, Duration::ZERO);
                    let incarnation = self.next_incarnation;
                    self.next_incarnation += 1;

                    tracing::info!("Session {} discovered ({})", id, name);
                    self.sessions.insert(
                        id,
                        Session {
                            id,
                            name,
                            output,
                            status: classification.status,
                            hints: classification.hints,
                            updated_at: Local::now(),
                            incarnation,
                            summary: None,
                            stale,
                            last_changed: now,
                        },
                    );
                    report.added.push(id);
                }
            }
        }

        // Sessions found in the same scan are appended in id order
        report.added.sort();
        self.order.extend(report.added.iter().copied());

        report
    }

    /// Attach a summary, provided the session is still the same incarnation.
    pub fn set_summary(&mut self, id: SessionId, incarnation: u64, summary: String) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) if session.incarnation == incarnation => {
                session.summary = Some(summary);
                true
            }
            _ => false,
        }
    }
}

/// One scan of the backend: list tabs, keep those matching `filter`, read each.
/// A tab that closes mid-scan is skipped; other read failures yield a capture
/// without output so the session is kept but marked stale.
pub async fn capture_sessions(
    backend: &dyn SessionBackend,
    filter: &[String],
) -> Result<Vec<Capture>, AutomationError> {
    let sessions = backend.list_sessions().await?;
    let mut captures = Vec::with_capacity(sessions.len());

    for info in sessions.into_iter().filter(|s| s.matches_filter(filter)) {
        match backend.read_output(info.id).await {
            Ok(output) => captures.push(Capture { info, output: Some(output) }),
            Err(AutomationError::Vanished(id)) => {
                tracing::debug!("Session {} closed during scan", id);
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", info.id, e);
                captures.push(Capture { info, output: None });
            }
        }
    }

    Ok(captures)
}

/// The last `n` characters of `text`, on a char boundary
pub fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Classifier::new(&ClassifierConfig::default()), 50)
    }

    fn capture(window: u32, tab: u32, output: &str) -> Capture {
        Capture {
            info: SessionInfo {
                id: SessionId::new(window, tab),
                title: format!("claude {window}/{tab}"),
                processes: String::new(),
            },
            output: Some(output.to_string()),
        }
    }

    #[test]
    fn test_discovers_and_orders_sessions() {
        let mut registry = registry();
        let report = registry.apply_poll(
            vec![capture(2, 1, "b"), capture(1, 2, "a2"), capture(1, 1, "a1")],
            Instant::now(),
        );

        assert_eq!(report.added.len(), 3);
        assert_eq!(
            registry.ordered_ids(),
            vec![SessionId::new(1, 1), SessionId::new(1, 2), SessionId::new(2, 1)]
        );
        assert_eq!(registry.windows(), vec![1, 2]);
        assert_eq!(registry.position(SessionId::new(2, 1)), Some(2));
    }

    #[test]
    fn test_removes_vanished_sessions() {
        let mut registry = registry();
        let now = Instant::now();
        registry.apply_poll(vec![capture(1, 1, "a"), capture(1, 2, "b")], now);

        let report = registry.apply_poll(vec![capture(1, 2, "b")], now);
        assert_eq!(report.removed, vec![SessionId::new(1, 1)]);
        assert!(!registry.contains(SessionId::new(1, 1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_new_sessions_are_appended_after_existing_ones() {
        let mut registry = registry();
        let now = Instant::now();
        registry.apply_poll(vec![capture(5, 1, "a"), capture(5, 2, "b")], now);

        let report = registry.apply_poll(
            vec![capture(3, 1, "c"), capture(5, 1, "a"), capture(5, 2, "b")],
            now,
        );
        assert_eq!(report.added, vec![SessionId::new(3, 1)]);
        assert_eq!(
            registry.ordered_ids(),
            vec![SessionId::new(5, 1), SessionId::new(5, 2), SessionId::new(3, 1)]
        );
        assert_eq!(registry.first_id(), Some(SessionId::new(5, 1)));
        assert_eq!(registry.windows(), vec![5, 3]);
    }

    #[test]
    fn test_move_session() {
        let mut registry = registry();
        let now = Instant::now();
        registry.apply_poll(vec![capture(1, 1, "a"), capture(1, 2, "b"), capture(2, 1, "c")], now);

        assert!(registry.move_session(SessionId::new(2, 1), -1));
        assert_eq!(registry.position(SessionId::new(2, 1)), Some(1));
        assert!(!registry.move_session(SessionId::new(1, 1), -1));
        assert!(registry.move_session(SessionId::new(1, 1), 5));
        assert_eq!(
            registry.ordered_ids(),
            vec![SessionId::new(2, 1), SessionId::new(1, 2), SessionId::new(1, 1)]
        );

        // A removed session leaves the order; the rest keep their places
        registry.apply_poll(vec![capture(1, 1, "a"), capture(2, 1, "c")], now);
        assert_eq!(registry.ordered_ids(), vec![SessionId::new(2, 1), SessionId::new(1, 1)]);
        let names: Vec<&str> = registry.sessions().map(|s| s.output.as_str()).collect();
        assert_eq!(names, vec!["c", "a"]);
    }

    #[test]
    fn test_rediscovered_id_gets_new_incarnation() {
        let mut registry = registry();
        let now = Instant::now();
        let id = SessionId::new(1, 1);

        registry.apply_poll(vec![capture(1, 1, "a")], now);
        let first = registry.get(id).unwrap().incarnation;
        registry.apply_poll(vec![], now);
        registry.apply_poll(vec![capture(1, 1, "a")], now);
        let second = registry.get(id).unwrap().incarnation;

        assert_ne!(first, second);
        assert!(!registry.set_summary(id, first, "old".to_string()));
        assert!(registry.set_summary(id, second, "new".to_string()));
        assert_eq!(registry.get(id).unwrap().summary.as_deref(), Some("new"));
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut registry = registry();
        let long = "x".repeat(200);
        registry.apply_poll(vec![capture(1, 1, &long)], Instant::now());
        assert_eq!(registry.get(SessionId::new(1, 1)).unwrap().output.chars().count(), 50);
    }

    #[test]
    fn test_unchanged_output_goes_idle_after_grace() {
        let mut registry = registry();
        let t0 = Instant::now();
        let id = SessionId::new(1, 1);

        registry.apply_poll(vec![capture(1, 1, "compiling crate")], t0);
        assert_eq!(registry.get(id).unwrap().status, SessionStatus::Running);

        let report = registry.apply_poll(vec![capture(1, 1, "compiling crate")], t0 + Duration::from_secs(1));
        assert!(report.transitions.is_empty());

        let report = registry.apply_poll(vec![capture(1, 1, "compiling crate")], t0 + Duration::from_secs(10));
        assert_eq!(
            report.transitions,
            vec![Transition {
                id,
                from: SessionStatus::Running,
                to: SessionStatus::Idle,
                output_changed: false,
            }]
        );
    }

    #[test]
    fn test_new_output_resets_quiet_time() {
        let mut registry = registry();
        let t0 = Instant::now();
        let id = SessionId::new(1, 1);

        registry.apply_poll(vec![capture(1, 1, "step one")], t0);
        registry.apply_poll(vec![capture(1, 1, "step one")], t0 + Duration::from_secs(10));
        assert_eq!(registry.get(id).unwrap().status, SessionStatus::Idle);

        let report = registry.apply_poll(
            vec![capture(1, 1, "step one\nstep two")],
            t0 + Duration::from_secs(11),
        );
        assert_eq!(registry.get(id).unwrap().status, SessionStatus::Running);
        assert!(report.transitions[0].output_changed);
    }

    #[test]
    fn test_failed_read_keeps_previous_output() {
        let mut registry = registry();
        let now = Instant::now();
        let id = SessionId::new(1, 1);
        registry.apply_poll(vec![capture(1, 1, "hello")], now);

        let mut failed = capture(1, 1, "");
        failed.output = None;
        registry.apply_poll(vec![failed], now);

        let session = registry.get(id).unwrap();
        assert!(session.stale);
        assert_eq!(session.output, "hello");
    }

    struct ScriptedBackend;

    #[async_trait::async_trait]
    impl SessionBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn program(&self) -> &str {
            "true"
        }

        async fn list_sessions(&self) -> Result<Vec<SessionInfo>, AutomationError> {
            Ok(vec![
                capture(1, 1, "").info,
                capture(1, 2, "").info,
                capture(1, 3, "").info,
                SessionInfo {
                    id: SessionId::new(2, 1),
                    title: "vim".to_string(),
                    processes: "login,vim".to_string(),
                },
            ])
        }

        async fn read_output(&self, id: SessionId) -> Result<String, AutomationError> {
            match id.tab {
                1 => Ok("hello".to_string()),
                2 => Err(AutomationError::Vanished(id)),
                _ => Err(AutomationError::Timeout("read_output")),
            }
        }

        async fn activate(&self, _id: SessionId) -> Result<(), AutomationError> {
            Ok(())
        }

        async fn inject_text(&self, _id: SessionId, _text: &str) -> Result<(), AutomationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_capture_filters_and_tolerates_read_failures() {
        let captures = capture_sessions(&ScriptedBackend, &["claude".to_string()])
            .await
            .unwrap();

        let ids: Vec<SessionId> = captures.iter().map(|c| c.info.id).collect();
        assert_eq!(ids, vec![SessionId::new(1, 1), SessionId::new(1, 3)]);
        assert_eq!(captures[0].output.as_deref(), Some("hello"));
        assert_eq!(captures[1].output, None);
    }

    #[test]
    fn test_tail_chars_respects_char_boundaries() {
        assert_eq!(tail_chars("こんにちは", 2), "ちは");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("abc", 0), "");
    }
}
