use async_trait::async_trait;
use std::time::Duration;

use super::{truncate_chars, RemoteError, SummaryBackend};
use crate::terminal::{Classifier, SessionStatus};

const NO_OUTPUT: &str = "No output yet.";

/// Offline summary built from status markers and the latest lines of output
pub struct LocalSummarizer {
    classifier: Classifier,
}

impl LocalSummarizer {
    pub fn new(classifier: Classifier) -> Self {
        Self { classifier }
    }

    pub fn summarize_text(&self, output: &str, max_length: usize) -> String {
        let lines: Vec<&str> = output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return NO_OUTPUT.to_string();
        }

        let classification = self.classifier.classify(output, Duration::MAX);
        let mut parts: Vec<String> = Vec::new();

        if classification.status == SessionStatus::Error {
            parts.push("Error detected.".to_string());
        }
        if let Some(progress) = classification.hints.progress {
            parts.push(format!("Tasks: {} of {} done.", progress.completed, progress.total));
        }
        if classification.status == SessionStatus::WaitingForInput {
            parts.push("Waiting for input.".to_string());
        }

        let mut recent: Vec<&str> = Vec::new();
        let mut recent_len = 0;
        for line in lines.iter().rev().filter(|l| !is_prompt_line(l)) {
            recent.insert(0, line);
            recent_len += line.chars().count() + 1;
            if recent_len > max_length / 2 {
                break;
            }
        }

        if !recent.is_empty() {
            let used: usize = parts.iter().map(|p| p.chars().count() + 1).sum();
            let room = max_length.saturating_sub(used);
            if room > 0 {
                parts.push(truncate_chars(&recent.join(" "), room));
            }
        }

        if parts.is_empty() {
            return "Working.".to_string();
        }

        truncate_chars(&parts.join(" "), max_length)
    }
}

/// Shell prompts, input boxes and pure decoration carry nothing worth reading out
fn is_prompt_line(line: &str) -> bool {
    line.starts_with('$')
        || line.starts_with('>')
        || line.starts_with('❯')
        || line
            .chars()
            .all(|c| matches!(c, '─' | '━' | '│' | '╭' | '╮' | '╰' | '╯' | '-' | '=' | ' '))
}

#[async_trait]
impl SummaryBackend for LocalSummarizer {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn summarize(&self, output: &str, max_length: usize) -> Result<String, RemoteError> {
        Ok(self.summarize_text(output, max_length))
    }
}
