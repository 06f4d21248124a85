mod apple;
mod heuristics;
mod tmux;

pub use apple::TerminalAppClient;
pub use heuristics::{Classifier, Hints, SessionStatus};
pub use tmux::TmuxClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::config::BackendKind;

/// Upper bound for a single automation command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifies one terminal context. Ordered by window, then tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId {
    /// Backend window identifier
    pub window: u32,
    /// 1-based tab (or pane) position within the window
    pub tab: u32,
}

impl SessionId {
    pub fn new(window: u32, tab: u32) -> Self {
        Self { window, tab }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}:T{}", self.window, self.tab)
    }
}

/// A terminal context as reported by a backend scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    /// Tab title or window name
    pub title: String,
    /// Processes running in the tab, comma separated
    pub processes: String,
}

impl SessionInfo {
    /// Whether the title or process list mentions any of `keywords`.
    /// An empty keyword list matches everything.
    pub fn matches_filter(&self, keywords: &[String]) -> bool {
        if keywords.is_empty() {
            return true;
        }
        let title = self.title.to_lowercase();
        let processes = self.processes.to_lowercase();
        keywords.iter().any(|k| {
            let k = k.to_lowercase();
            title.contains(&k) || processes.contains(&k)
        })
    }

    pub fn display_name(&self) -> String {
        if !self.title.is_empty() {
            self.title.clone()
        } else if !self.processes.is_empty() {
            self.processes.clone()
        } else {
            "Unknown".to_string()
        }
    }
}

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: &'static str, stderr: String },

    #[error("session {0} no longer exists")]
    Vanished(SessionId),

    #[error("automation permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Window/tab enumeration, output capture and keystroke injection
#[async_trait]
pub trait SessionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// External program this backend shells out to
    fn program(&self) -> &str;

    /// Every tab currently open, in a stable order
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, AutomationError>;

    /// Visible text of a tab
    async fn read_output(&self, id: SessionId) -> Result<String, AutomationError>;

    /// Bring a tab to the front
    async fn activate(&self, id: SessionId) -> Result<(), AutomationError>;

    /// Type `text` into a tab followed by Enter
    async fn inject_text(&self, id: SessionId, text: &str) -> Result<(), AutomationError>;
}

pub fn backend_for(kind: BackendKind) -> Arc<dyn SessionBackend> {
    match kind {
        BackendKind::TerminalApp => Arc::new(TerminalAppClient::new()),
        BackendKind::Tmux => Arc::new(TmuxClient::new()),
    }
}

/// Run a command to completion under [`COMMAND_TIMEOUT`], returning stdout.
async fn run_command(
    command: &'static str,
    program: &str,
    args: &[&str],
) -> Result<String, AutomationError> {
    let output = tokio::time::timeout(
        COMMAND_TIMEOUT,
        Command::new(program).args(args).kill_on_drop(true).output(),
    )
    .await
    .map_err(|_| AutomationError::Timeout(command))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_permission_error(&stderr) {
            return Err(AutomationError::PermissionDenied(stderr));
        }
        return Err(AutomationError::CommandFailed { command, stderr });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn is_permission_error(stderr: &str) -> bool {
    // -1743: errAEEventNotPermitted, -1719: assistive access missing
    stderr.contains("-1743") || stderr.contains("-1719") || stderr.contains("not allowed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(title: &str, processes: &str) -> SessionInfo {
        SessionInfo {
            id: SessionId::new(1, 1),
            title: title.to_string(),
            processes: processes.to_string(),
        }
    }

    #[test]
    fn test_session_id_orders_by_window_then_tab() {
        let mut ids = vec![
            SessionId::new(2, 1),
            SessionId::new(1, 3),
            SessionId::new(1, 1),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![SessionId::new(1, 1), SessionId::new(1, 3), SessionId::new(2, 1)]
        );
    }

    #[test]
    fn test_filter_matches_title_or_processes() {
        let keywords = vec!["claude".to_string()];
        assert!(info("Claude Code", "").matches_filter(&keywords));
        assert!(info("", "login,-zsh,claude").matches_filter(&keywords));
        assert!(!info("vim", "login,-zsh,vim").matches_filter(&keywords));
        assert!(info("vim", "").matches_filter(&[]));
    }

    #[test]
    fn test_permission_errors_are_recognised() {
        assert!(is_permission_error(
            "execution error: Not authorized to send Apple events to Terminal. (-1743)"
        ));
        assert!(!is_permission_error("can't find session: foo"));
    }
}
