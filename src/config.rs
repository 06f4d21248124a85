//! Process-wide settings, loaded once at startup and read-only afterwards.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder shipped in sample config files; treated as "no key".
const PLACEHOLDER_API_KEY: &str = "your-api-key-here";

/// Which terminal automation layer to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// macOS Terminal.app via `osascript`
    #[default]
    TerminalApp,
    /// tmux server via the `tmux` CLI
    Tmux,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    /// Poll interval for re-reading session output
    pub poll_interval_ms: u64,
    /// Characters of output retained per session
    pub max_buffer_chars: usize,
    /// Only tabs whose title or process list mentions one of these are monitored.
    /// Empty means every tab.
    pub session_filter: Vec<String>,
    pub classifier: ClassifierConfig,
    pub summary: SummaryConfig,
    pub api: ApiConfig,
    pub speech: SpeechConfig,
    pub voice: VoiceConfig,
    pub theme: ThemeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            poll_interval_ms: 1000,
            max_buffer_chars: 20_000,
            session_filter: vec!["claude".to_string()],
            classifier: ClassifierConfig::default(),
            summary: SummaryConfig::default(),
            api: ApiConfig::default(),
            speech: SpeechConfig::default(),
            voice: VoiceConfig::default(),
            theme: ThemeConfig::default(),
        }
    }
}

/// Marker patterns for the output classifier. Each entry is a regex evaluated
/// against the tail of the captured output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Number of trailing lines inspected for status markers
    pub tail_lines: usize,
    /// Output unchanged for this long with no markers counts as idle
    pub idle_grace_ms: u64,
    pub error_patterns: Vec<String>,
    pub waiting_patterns: Vec<String>,
    pub running_patterns: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tail_lines: 20,
            idle_grace_ms: 3000,
            error_patterns: vec![
                r"(?i)\b(error|failed|exception|panic(ked)?|fatal|traceback|cannot|unable to)\b"
                    .to_string(),
                r"(エラー|失敗|例外|できません)".to_string(),
            ],
            waiting_patterns: vec![
                r"(?m)^\s*[>❯]\s*$".to_string(),
                r"(?m)\?\s*$".to_string(),
                r"(?i)(\[y/n\]|\(y/n\)|yes/no|press enter)".to_string(),
                r"(?i)\b(choose|select|which (one|option|approach))\b".to_string(),
                r"(選択してください|選んでください|どちらにしますか)".to_string(),
                r"(?m)\[[^\]]*\]\s*:\s*$".to_string(),
            ],
            running_patterns: vec![
                r"[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]".to_string(),
                r"(?i)(thinking|processing|working)(…|\.{3})?".to_string(),
                r"(?i)esc to interrupt".to_string(),
                r"(?m)\.\.\.\s*$".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Upper bound on summary length in characters
    pub max_length: usize,
    /// Minimum seconds between automatic summaries of the same session
    pub min_interval_secs: u64,
    /// Speak a summary when a session settles into idle or waiting
    pub auto_announce: bool,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_length: 150,
            min_interval_secs: 30,
            auto_announce: true,
        }
    }
}

/// Remote summarizer credentials and request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub anthropic_api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub instructions: String,
    pub max_input_chars: usize,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 200,
            temperature: 0.7,
            instructions: "Summarize the following coding assistant session output so it can be \
                           read aloud in about ten seconds (roughly 150 characters). Mention \
                           errors, questions waiting for an answer and task progress."
                .to_string(),
            max_input_chars: 10_000,
            timeout_secs: 20,
        }
    }
}

impl ApiConfig {
    /// The usable API key, if any. Blank and placeholder keys count as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.anthropic_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && *k != PLACEHOLDER_API_KEY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    /// Voice name passed to `say -v`; system default when unset
    pub voice: Option<String>,
    /// Words per minute
    pub rate: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voice: None,
            rate: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// External recognizer printing one transcript per line, e.g. `["hear", "-l", "ja-JP"]`.
    /// Voice input is disabled when empty.
    pub recognizer_command: Vec<String>,
    pub restart_delay_ms: u64,
    /// Text injected for "select choice N"; `{n}` is replaced by the number
    pub choice_template: String,
    pub vocabulary: VoiceVocabulary,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            recognizer_command: Vec::new(),
            restart_delay_ms: 2000,
            choice_template: "{n}".to_string(),
            vocabulary: VoiceVocabulary::default(),
        }
    }
}

/// Trigger phrases per intent. Matching is case-insensitive substring search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceVocabulary {
    pub next: Vec<String>,
    pub previous: Vec<String>,
    pub summarize: Vec<String>,
    pub refresh: Vec<String>,
    /// Words that precede a tab number ("tab 3")
    pub tab_prefixes: Vec<String>,
    /// Words that precede a window number ("window 2")
    pub window_prefixes: Vec<String>,
    /// Words that precede a choice number ("choice 1")
    pub choice_prefixes: Vec<String>,
    /// Words that follow a choice number ("1番")
    pub choice_suffixes: Vec<String>,
    /// Spoken numbers, e.g. "three" or "さん". A transcript consisting of
    /// just one of these selects that choice.
    pub number_words: BTreeMap<String, u32>,
    /// Largest number accepted in numbered commands
    pub max_number: u32,
}

impl Default for VoiceVocabulary {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        Self {
            next: words(&["next tab", "next", "タブ切り替え", "次のタブ", "ネクスト"]),
            previous: words(&["previous tab", "previous", "go back", "前のタブ", "プレビアス", "戻る"]),
            summarize: words(&["summarize", "summary", "read it", "要約", "読み上げ"]),
            refresh: words(&["refresh", "reload", "更新", "リフレッシュ"]),
            tab_prefixes: words(&["tab", "タブ"]),
            window_prefixes: words(&["window", "ウィンドウ"]),
            choice_prefixes: words(&["choice", "option", "select", "選択"]),
            choice_suffixes: words(&["番"]),
            // Single-kana readings (に, ご, し) are left out: they occur in ordinary speech
            number_words: [
                ("one", 1),
                ("two", 2),
                ("three", 3),
                ("four", 4),
                ("five", 5),
                ("six", 6),
                ("seven", 7),
                ("eight", 8),
                ("nine", 9),
                ("ten", 10),
                ("いち", 1),
                ("さん", 3),
                ("よん", 4),
                ("ろく", 6),
                ("なな", 7),
                ("しち", 7),
                ("はち", 8),
                ("きゅう", 9),
                ("じゅう", 10),
            ]
            .into_iter()
            .map(|(word, n)| (word.to_string(), n))
            .collect(),
            max_number: 100,
        }
    }
}

/// Status board colors as `#rrggbb`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub bg: String,
    pub fg: String,
    pub accent: String,
    pub dim: String,
    pub running: String,
    pub waiting: String,
    pub error: String,
    pub idle: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            bg: "#1e1e1e".to_string(),
            fg: "#dcdcdc".to_string(),
            accent: "#d97757".to_string(),
            dim: "#646464".to_string(),
            running: "#4caf50".to_string(),
            waiting: "#ffc107".to_string(),
            error: "#f44336".to_string(),
            idle: "#9e9e9e".to_string(),
        }
    }
}

impl Config {
    /// Application directory (~/.voicedeck/)
    pub fn app_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".voicedeck")
    }

    /// Default config file path (~/.voicedeck/config.json)
    pub fn default_path() -> PathBuf {
        Self::app_dir().join("config.json")
    }

    /// Directory for log files (~/.voicedeck/logs/)
    pub fn log_dir() -> PathBuf {
        Self::app_dir().join("logs")
    }

    /// Parse a config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist.
    ///
    /// A missing API key is filled from `ANTHROPIC_API_KEY`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            tracing::info!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        if config.api.api_key().is_none() {
            if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
                config.api.anthropic_api_key = Some(key);
            }
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "backend": "tmux", "summary": {{ "max_length": 80 }}, "voice": {{ "vocabulary": {{ "max_number": 9 }} }} }}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.backend, BackendKind::Tmux);
        assert_eq!(config.summary.max_length, 80);
        assert_eq!(config.summary.min_interval_secs, 30);
        assert_eq!(config.voice.vocabulary.max_number, 9);
        assert!(!config.voice.vocabulary.tab_prefixes.is_empty());
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_placeholder_api_key_counts_as_missing() {
        let mut api = ApiConfig::default();
        assert_eq!(api.api_key(), None);

        api.anthropic_api_key = Some(PLACEHOLDER_API_KEY.to_string());
        assert_eq!(api.api_key(), None);

        api.anthropic_api_key = Some("   ".to_string());
        assert_eq!(api.api_key(), None);

        api.anthropic_api_key = Some("sk-ant-123".to_string());
        assert_eq!(api.api_key(), Some("sk-ant-123"));
    }

    #[test]
    fn test_default_patterns_compile() {
        let classifier = ClassifierConfig::default();
        for pattern in classifier
            .error_patterns
            .iter()
            .chain(&classifier.waiting_patterns)
            .chain(&classifier.running_patterns)
        {
            assert!(regex::Regex::new(pattern).is_ok(), "bad pattern {pattern}");
        }
    }
}
