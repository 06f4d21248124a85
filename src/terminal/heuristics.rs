use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ClassifierConfig;

/// Status of an agent session, derived from its latest output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum SessionStatus {
    /// No new output for the grace period
    #[default]
    Idle,
    /// Agent is actively producing output
    Running,
    /// Agent is waiting for user input (confirmation, question, choice)
    WaitingForInput,
    /// Agent hit an error
    Error,
}

impl SessionStatus {
    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::WaitingForInput => "waiting",
            SessionStatus::Error => "error",
        }
    }
}

/// Todo progress such as "3/5 completed"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoProgress {
    pub completed: u32,
    pub total: u32,
}

/// Structured hints pulled from the output for the current poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hints {
    /// Offered choices, in output order
    pub choices: Vec<String>,
    /// Pending todo items, in output order
    pub todos: Vec<String>,
    /// Lines carrying an error marker
    pub error_lines: Vec<String>,
    pub progress: Option<TodoProgress>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub status: SessionStatus,
    pub hints: Hints,
}

static RE_CHOICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[❯>]\s*)?(?:\d+[.)]|\[[A-Za-z0-9]\])\s+(.+?)\s*$").unwrap()
});

static RE_TODO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[⎿└]\s*)?(?:☐|□|◻|- \[ \]|\* \[ \]|TODO:)\s*(.+?)\s*$").unwrap()
});

static RE_PROGRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*/\s*(\d+)\s*(?:completed|tasks?|done)").unwrap());

/// One marker rule: when `pattern` matches the tail, the session has `status`
struct Rule {
    status: SessionStatus,
    pattern: Regex,
}

/// Rule-based classifier for captured session output.
///
/// Rules are checked in priority order (error, waiting, running); the first
/// match decides. Without a match the output's quiet time picks running or idle.
pub struct Classifier {
    rules: Vec<Rule>,
    tail_lines: usize,
    idle_grace: Duration,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let groups = [
            (SessionStatus::Error, &config.error_patterns),
            (SessionStatus::WaitingForInput, &config.waiting_patterns),
            (SessionStatus::Running, &config.running_patterns),
        ];

        let mut rules = Vec::new();
        for (status, patterns) in groups {
            for pattern in patterns {
                match Regex::new(pattern) {
                    Ok(pattern) => rules.push(Rule { status, pattern }),
                    Err(e) => tracing::warn!("Ignoring invalid {:?} pattern {:?}: {}", status, pattern, e),
                }
            }
        }

        Self {
            rules,
            tail_lines: config.tail_lines.max(1),
            idle_grace: Duration::from_millis(config.idle_grace_ms),
        }
    }

    /// Classify `output`, which has not changed for `quiet_for`.
    pub fn classify(&self, output: &str, quiet_for: Duration) -> Classification {
        let recent = tail_lines(output, self.tail_lines);

        let status = self
            .rules
            .iter()
            .find(|rule| rule.pattern.is_match(&recent))
            .map(|rule| rule.status)
            .unwrap_or_else(|| {
                if output.trim().is_empty() || quiet_for >= self.idle_grace {
                    SessionStatus::Idle
                } else {
                    SessionStatus::Running
                }
            });

        Classification {
            status,
            hints: self.extract_hints(output, &recent),
        }
    }

    fn extract_hints(&self, output: &str, recent: &str) -> Hints {
        let mut hints = Hints::default();

        for line in recent.lines() {
            if let Some(caps) = RE_TODO.captures(line) {
                hints.todos.push(caps[1].to_string());
            } else if let Some(caps) = RE_CHOICE.captures(line) {
                hints.choices.push(caps[1].to_string());
            }

            if self.is_error_line(line) {
                hints.error_lines.push(line.trim().to_string());
            }
        }

        hints.progress = RE_PROGRESS.captures(output).and_then(|caps| {
            Some(TodoProgress {
                completed: caps[1].parse().ok()?,
                total: caps[2].parse().ok()?,
            })
        });

        hints
    }

    fn is_error_line(&self, line: &str) -> bool {
        self.rules
            .iter()
            .filter(|rule| rule.status == SessionStatus::Error)
            .any(|rule| rule.pattern.is_match(line))
    }
}

/// The last `n` lines of `text`
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().rev().take(n).collect();
    lines.into_iter().rev().collect::<Vec<_>>().join("\n")
}
