use async_trait::async_trait;

use super::{run_command, AutomationError, SessionBackend, SessionId, SessionInfo};

/// Field separator used in the listing script (ASCII unit separator)
const FIELD_SEP: char = '\u{1f}';

/// Prefix the contents script puts before a caught AppleScript error
const ERROR_MARK: &str = "\u{1f}ERROR ";

/// AppleScript errors meaning the tab or window is gone: "Can't get"
/// (-1728) and "Invalid index" (-1719)
const GONE_ERRORS: [&str; 4] = ["-1728", "-1719", "Can't get", "Invalid index"];

const LIST_SCRIPT: &str = r#"
set sep to character id 31
set output to ""
tell application "Terminal"
    repeat with w in windows
        set wid to id of w
        repeat with t from 1 to count of tabs of w
            set tabName to ""
            try
                set tabName to custom title of tab t of w
            end try
            set procText to ""
            try
                set AppleScript's text item delimiters to ","
                set procText to (processes of tab t of w) as string
                set AppleScript's text item delimiters to ""
            end try
            set output to output & wid & sep & t & sep & tabName & sep & procText & linefeed
        end repeat
    end repeat
end tell
return output
"#;

/// Client for Terminal.app, driven through `osascript`.
///
/// Windows are addressed by their AppleScript `id`, which stays stable when
/// windows are reordered; tabs by their 1-based index.
pub struct TerminalAppClient {
    osascript_path: String,
}

impl TerminalAppClient {
    pub fn new() -> Self {
        Self {
            osascript_path: "osascript".to_string(),
        }
    }

    async fn run_script(&self, command: &'static str, script: &str) -> Result<String, AutomationError> {
        run_command(command, &self.osascript_path, &["-e", script]).await
    }

    fn parse_listing(output: &str) -> Vec<SessionInfo> {
        output
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(4, FIELD_SEP);
                let window = parts.next()?.trim().parse().ok()?;
                let tab = parts.next()?.trim().parse().ok()?;
                let title = parts.next().unwrap_or("").trim().to_string();
                let processes = parts.next().unwrap_or("").trim().to_string();
                Some(SessionInfo {
                    id: SessionId::new(window, tab),
                    title,
                    processes,
                })
            })
            .collect()
    }
}

impl Default for TerminalAppClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpret the output of the contents script. Only errors saying the tab is
/// gone count as vanished; anything else is a failed read.
fn read_result(id: SessionId, output: String) -> Result<String, AutomationError> {
    let Some(error) = output.strip_prefix(ERROR_MARK) else {
        return Ok(output);
    };
    let error = error.trim();
    tracing::debug!("Reading {} failed: {}", id, error);
    if GONE_ERRORS.iter().any(|marker| error.contains(marker)) {
        Err(AutomationError::Vanished(id))
    } else {
        Err(AutomationError::CommandFailed {
            command: "osascript contents",
            stderr: error.to_string(),
        })
    }
}

/// Escape text for embedding in an AppleScript string literal
fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\n', '\r'], " ")
}

#[async_trait]
impl SessionBackend for TerminalAppClient {
    fn name(&self) -> &'static str {
        "Terminal.app"
    }

    fn program(&self) -> &str {
        &self.osascript_path
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, AutomationError> {
        let output = self.run_script("osascript list", LIST_SCRIPT).await?;
        let mut sessions = Self::parse_listing(&output);
        sessions.sort_by_key(|s| s.id);
        Ok(sessions)
    }

    async fn read_output(&self, id: SessionId) -> Result<String, AutomationError> {
        let script = format!(
            r#"tell application "Terminal"
    try
        return contents of tab {} of window id {}
    on error errMsg number errNum
        return (character id 31) & "ERROR " & errNum & ": " & errMsg
    end try
end tell"#,
            id.tab, id.window
        );

        let output = self.run_script("osascript contents", &script).await?;
        read_result(id, output)
    }

    async fn activate(&self, id: SessionId) -> Result<(), AutomationError> {
        let script = format!(
            r#"tell application "Terminal"
    activate
    set index of window id {window} to 1
    set selected of tab {tab} of window id {window} to true
end tell"#,
            window = id.window,
            tab = id.tab
        );

        self.run_script("osascript activate", &script).await?;
        Ok(())
    }

    async fn inject_text(&self, id: SessionId, text: &str) -> Result<(), AutomationError> {
        self.activate(id).await?;

        let script = format!(
            r#"tell application "Terminal"
    do script "{}" in tab {} of window id {}
end tell"#,
            escape_applescript(text),
            id.tab,
            id.window
        );

        self.run_script("osascript do script", &script).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing() {
        let output = format!(
            "4711{s}1{s}{s}login,-zsh,claude\n4711{s}2{s}Build{s}login,-zsh\nbogus line\n",
            s = FIELD_SEP
        );
        let sessions = TerminalAppClient::parse_listing(&output);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, SessionId::new(4711, 1));
        assert_eq!(sessions[0].title, "");
        assert_eq!(sessions[0].processes, "login,-zsh,claude");
        assert_eq!(sessions[1].title, "Build");
    }

    #[test]
    fn test_read_result_keeps_plain_output() {
        let id = SessionId::new(7, 1);
        let output = "ERROR: build failed\n$ ".to_string();
        assert_eq!(read_result(id, output.clone()).unwrap(), output);
    }

    #[test]
    fn test_missing_tab_is_vanished() {
        let id = SessionId::new(7, 3);
        let output = format!("{}-1728: Can't get tab 3 of window id 7.", ERROR_MARK);
        assert!(matches!(read_result(id, output), Err(AutomationError::Vanished(v)) if v == id));

        let output = format!("{}-1719: Invalid index.", ERROR_MARK);
        assert!(matches!(read_result(id, output), Err(AutomationError::Vanished(_))));
    }

    #[test]
    fn test_other_script_errors_are_failed_reads() {
        let id = SessionId::new(7, 1);
        let output = format!("{}-1712: AppleEvent timed out.\n", ERROR_MARK);
        match read_result(id, output) {
            Err(AutomationError::CommandFailed { command, stderr }) => {
                assert_eq!(command, "osascript contents");
                assert_eq!(stderr, "-1712: AppleEvent timed out.");
            }
            other => panic!("expected a failed read, got {:?}", other),
        }
    }

    #[test]
    fn test_escape_applescript() {
        assert_eq!(escape_applescript(r#"say "hi" \ bye"#), r#"say \"hi\" \\ bye"#);
        assert_eq!(escape_applescript("a\nb"), "a b");
    }
}
