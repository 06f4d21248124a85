//! `voicedeck --check`: verify the external programs and credentials.

use std::fmt;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckLevel {
    Ok,
    /// Optional feature unavailable
    Warning,
    /// Voicedeck cannot run
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckItem {
    pub level: CheckLevel,
    pub message: String,
}

impl fmt::Display for CheckItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = match self.level {
            CheckLevel::Ok => "✓",
            CheckLevel::Warning => "!",
            CheckLevel::Failure => "✗",
        };
        write!(f, "  {} {}", mark, self.message)
    }
}

/// Locate an executable `program` on the given search path. Names containing
/// a path separator are resolved against the working directory.
fn find_program(program: &str, path_var: Option<&str>) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    which::which_in(program, path_var, cwd).ok()
}

/// Run every check against the current `PATH`
pub fn run_checks(config: &Config, backend_program: &str, voice_enabled: bool) -> Vec<CheckItem> {
    let path_var = std::env::var("PATH").ok();
    checks_with_path(config, backend_program, voice_enabled, path_var.as_deref())
}

fn checks_with_path(
    config: &Config,
    backend_program: &str,
    voice_enabled: bool,
    path_var: Option<&str>,
) -> Vec<CheckItem> {
    let program = |name: &str, role: &str, missing: CheckLevel| {
        match find_program(name, path_var) {
            Some(path) => CheckItem {
                level: CheckLevel::Ok,
                message: format!("{} ({}) at {}", role, name, path.display()),
            },
            None => CheckItem {
                level: missing,
                message: format!("{} ({}) not found on PATH", role, name),
            },
        }
    };

    let mut items = vec![program(backend_program, "terminal backend", CheckLevel::Failure)];

    if config.speech.enabled {
        items.push(program("say", "speech output", CheckLevel::Warning));
    }

    match config.voice.recognizer_command.first() {
        Some(recognizer) if voice_enabled => {
            items.push(program(recognizer, "speech recognizer", CheckLevel::Warning))
        }
        Some(_) => {}
        None => items.push(CheckItem {
            level: CheckLevel::Warning,
            message: "no speech recognizer configured; voice input disabled".to_string(),
        }),
    }

    items.push(match config.api.api_key() {
        Some(_) => CheckItem {
            level: CheckLevel::Ok,
            message: format!("API key configured, remote summaries with {}", config.api.model),
        },
        None => CheckItem {
            level: CheckLevel::Warning,
            message: "no API key; summaries use the local heuristic".to_string(),
        },
    });

    items
}

/// Whether voicedeck can start with these results
pub fn passed(items: &[CheckItem]) -> bool {
    !items.iter().any(|item| item.level == CheckLevel::Failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_program(path: &std::path::Path, mode: u32) {
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    fn path_with(programs: &[&str]) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        for program in programs {
            write_program(&dir.path().join(program), 0o755);
        }
        let path = dir.path().display().to_string();
        (dir, path)
    }

    #[test]
    fn test_missing_backend_fails() {
        let (_dir, path) = path_with(&["say"]);
        let items = checks_with_path(&Config::default(), "osascript", true, Some(&path));
        assert!(!passed(&items));
        assert_eq!(items[0].level, CheckLevel::Failure);
    }

    #[test]
    fn test_missing_optional_programs_only_warn() {
        let (_dir, path) = path_with(&["tmux"]);
        let mut config = Config::default();
        config.voice.recognizer_command = vec!["whisper-stream".to_string()];
        config.api.anthropic_api_key = None;

        let items = checks_with_path(&config, "tmux", true, Some(&path));
        assert!(passed(&items));
        assert_eq!(items[0].level, CheckLevel::Ok);
        assert!(items
            .iter()
            .any(|i| i.level == CheckLevel::Warning && i.message.contains("whisper-stream")));
        assert!(items.iter().any(|i| i.message.contains("local heuristic")));
    }

    #[test]
    fn test_recognizer_skipped_when_voice_disabled() {
        let (_dir, path) = path_with(&["tmux", "say"]);
        let mut config = Config::default();
        config.voice.recognizer_command = vec!["whisper-stream".to_string()];

        let items = checks_with_path(&config, "tmux", false, Some(&path));
        assert!(!items.iter().any(|i| i.message.contains("whisper-stream")));
    }

    #[test]
    fn test_non_executable_backend_fails() {
        let (dir, path) = path_with(&["say"]);
        write_program(&dir.path().join("tmux"), 0o644);

        let items = checks_with_path(&Config::default(), "tmux", true, Some(&path));
        assert!(!passed(&items));
        assert_eq!(items[0].level, CheckLevel::Failure);
        assert!(items[0].message.contains("not found"));
    }

    #[test]
    fn test_absolute_program_path() {
        let (dir, _path) = path_with(&["listen"]);
        let listen = dir.path().join("listen");
        assert_eq!(find_program(&listen.display().to_string(), None), Some(listen));
        assert_eq!(find_program("listen", None), None);
    }
}
