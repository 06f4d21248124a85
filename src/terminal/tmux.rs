use async_trait::async_trait;

use super::{run_command, AutomationError, SessionBackend, SessionId, SessionInfo};

/// Lines of scrollback captured per read
const CAPTURE_HISTORY_LINES: u32 = 200;

/// Client for interacting with tmux via CLI.
///
/// A tmux window maps to a session window (numeric part of `@id`), and a pane
/// maps to a tab (pane index + 1).
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
}

impl TmuxClient {
    pub fn new() -> Self {
        Self {
            tmux_path: "tmux".to_string(),
        }
    }

    async fn tmux(&self, command: &'static str, args: &[&str]) -> Result<String, AutomationError> {
        run_command(command, &self.tmux_path, args).await
    }

    fn parse_pane_line(line: &str) -> Option<SessionInfo> {
        // Format: window_id|pane_index|pane_current_command|session_name:window_name
        let mut parts = line.splitn(4, '|');
        let window = parts.next()?.trim_start_matches('@').parse().ok()?;
        let pane: u32 = parts.next()?.parse().ok()?;
        let processes = parts.next()?.to_string();
        let title = parts.next().unwrap_or("").to_string();

        Some(SessionInfo {
            id: SessionId::new(window, pane + 1),
            title,
            processes,
        })
    }

    /// tmux target for a session id, e.g. `@3.0`
    fn target(id: SessionId) -> String {
        format!("@{}.{}", id.window, id.tab.saturating_sub(1))
    }

    fn vanished_or(id: SessionId, err: AutomationError) -> AutomationError {
        match err {
            AutomationError::CommandFailed { ref stderr, .. }
                if stderr.contains("can't find") || stderr.contains("no such") =>
            {
                AutomationError::Vanished(id)
            }
            other => other,
        }
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionBackend for TmuxClient {
    fn name(&self) -> &'static str {
        "tmux"
    }

    fn program(&self) -> &str {
        &self.tmux_path
    }

    /// List every pane of every tmux session
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, AutomationError> {
        let result = self
            .tmux(
                "tmux list-panes",
                &[
                    "list-panes",
                    "-a",
                    "-F",
                    "#{window_id}|#{pane_index}|#{pane_current_command}|#{session_name}:#{window_name}",
                ],
            )
            .await;

        let stdout = match result {
            Ok(stdout) => stdout,
            Err(AutomationError::CommandFailed { stderr, .. })
                if stderr.contains("no server running") || stderr.contains("no sessions") =>
            {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut sessions: Vec<SessionInfo> =
            stdout.lines().filter_map(Self::parse_pane_line).collect();
        sessions.sort_by_key(|s| s.id);
        Ok(sessions)
    }

    async fn read_output(&self, id: SessionId) -> Result<String, AutomationError> {
        let target = Self::target(id);
        let start = format!("-{}", CAPTURE_HISTORY_LINES);
        self.tmux(
            "tmux capture-pane",
            &["capture-pane", "-p", "-J", "-t", &target, "-S", &start],
        )
        .await
        .map_err(|e| Self::vanished_or(id, e))
    }

    async fn activate(&self, id: SessionId) -> Result<(), AutomationError> {
        let window = format!("@{}", id.window);
        let target = Self::target(id);

        self.tmux("tmux select-window", &["select-window", "-t", &window])
            .await
            .map_err(|e| Self::vanished_or(id, e))?;
        self.tmux("tmux select-pane", &["select-pane", "-t", &target])
            .await
            .map_err(|e| Self::vanished_or(id, e))?;
        Ok(())
    }

    async fn inject_text(&self, id: SessionId, text: &str) -> Result<(), AutomationError> {
        let target = Self::target(id);

        self.tmux("tmux send-keys", &["send-keys", "-t", &target, "-l", text])
            .await
            .map_err(|e| Self::vanished_or(id, e))?;
        self.tmux("tmux send-keys", &["send-keys", "-t", &target, "Enter"])
            .await
            .map_err(|e| Self::vanished_or(id, e))?;
        Ok(())
    }
}
