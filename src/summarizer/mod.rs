//! Short spoken digests of session output.
//!
//! A remote language model is used when an API key is configured. Whenever it
//! is unavailable or fails, the local heuristic takes over, so summarizing
//! never fails from the caller's point of view.

mod anthropic;
mod local;

pub use anthropic::AnthropicSummarizer;
pub use local::LocalSummarizer;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::terminal::Classifier;

/// Why a remote summary could not be produced
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("API key rejected ({0})")]
    AuthInvalid(String),

    #[error("rate limited")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
}

impl RemoteError {
    /// Short classification used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::AuthInvalid(_) => "auth-invalid",
            RemoteError::RateLimited => "rate-limited",
            RemoteError::Network(_) => "network-error",
            RemoteError::MalformedResponse(_) => "malformed-response",
            RemoteError::Api { .. } => "api-error",
        }
    }
}

/// Something that can condense terminal output into a short text
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn summarize(&self, output: &str, max_length: usize) -> Result<String, RemoteError>;
}

/// Remote-with-fallback summarizer
pub struct Summarizer {
    remote: Option<Arc<dyn SummaryBackend>>,
    fallback: Arc<dyn SummaryBackend>,
    max_length: usize,
}

/// Said when even the fallback cannot produce a summary
const UNAVAILABLE: &str = "Summary unavailable.";

impl Summarizer {
    pub fn from_config(config: &Config) -> Self {
        let remote: Option<Arc<dyn SummaryBackend>> = match config.api.api_key() {
            Some(key) => match AnthropicSummarizer::new(key.to_string(), &config.api) {
                Ok(client) => {
                    tracing::info!("Remote summaries enabled (model {})", config.api.model);
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::warn!("Could not build HTTP client, using local summaries: {}", e);
                    None
                }
            },
            None => {
                tracing::info!("No API key configured, using local summaries");
                None
            }
        };

        Self {
            remote,
            fallback: Arc::new(LocalSummarizer::new(Classifier::new(&config.classifier))),
            max_length: config.summary.max_length,
        }
    }

    pub fn new(
        remote: Option<Arc<dyn SummaryBackend>>,
        fallback: Arc<dyn SummaryBackend>,
        max_length: usize,
    ) -> Self {
        Self {
            remote,
            fallback,
            max_length,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Summarize `output` in at most `max_length` characters.
    pub async fn summarize(&self, output: &str) -> String {
        if let (Some(remote), false) = (&self.remote, output.trim().is_empty()) {
            match remote.summarize(output, self.max_length).await {
                Ok(text) if !text.trim().is_empty() => {
                    return truncate_chars(text.trim(), self.max_length);
                }
                Ok(_) => {
                    tracing::warn!("{} returned an empty summary, falling back", remote.name());
                }
                Err(e) => {
                    tracing::warn!(kind = e.kind(), "{} summary failed, falling back: {}", remote.name(), e);
                }
            }
        }

        let text = match self.fallback.summarize(output, self.max_length).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(kind = e.kind(), "{} summary failed: {}", self.fallback.name(), e);
                UNAVAILABLE.to_string()
            }
        };
        truncate_chars(&text, self.max_length)
    }
}

/// Cut `text` to at most `max` characters, marking the cut with "..."
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max <= 3 {
        return text.chars().take(max).collect();
    }
    let mut cut: String = text.chars().take(max - 3).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRemote {
        calls: AtomicUsize,
        reply: fn() -> Result<String, RemoteError>,
    }

    impl FakeRemote {
        fn new(reply: fn() -> Result<String, RemoteError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply,
            })
        }
    }

    #[async_trait]
    impl SummaryBackend for FakeRemote {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn summarize(&self, _output: &str, _max_length: usize) -> Result<String, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.reply)()
        }
    }

    fn local() -> Arc<dyn SummaryBackend> {
        Arc::new(LocalSummarizer::new(Classifier::new(&ClassifierConfig::default())))
    }

    const OUTPUT: &str = "Reading src/main.rs\nUpdated the parser to handle nested blocks\n> ";

    #[tokio::test]
    async fn test_remote_result_is_trimmed_to_budget() {
        let remote = FakeRemote::new(|| Ok("word ".repeat(100)));
        let summarizer = Summarizer::new(Some(remote.clone()), local(), 40);

        let summary = summarizer.summarize(OUTPUT).await;
        assert!(summary.chars().count() <= 40);
        assert!(summary.ends_with("..."));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let remote = FakeRemote::new(|| Err(RemoteError::RateLimited));
        let summarizer = Summarizer::new(Some(remote.clone()), local(), 150);

        let summary = summarizer.summarize(OUTPUT).await;
        assert!(summary.contains("nested blocks"));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_remote_reply_falls_back() {
        let remote = FakeRemote::new(|| Ok("   ".to_string()));
        let summarizer = Summarizer::new(Some(remote), local(), 150);
        assert!(!summarizer.summarize(OUTPUT).await.trim().is_empty());
    }

    #[tokio::test]
    async fn test_without_key_no_remote_is_built() {
        let mut config = Config::default();
        config.api.anthropic_api_key = None;
        let summarizer = Summarizer::from_config(&config);
        assert!(!summarizer.is_remote());

        let summary = summarizer.summarize(OUTPUT).await;
        assert!(!summary.is_empty());
        assert!(summary.chars().count() <= config.summary.max_length);
    }

    #[tokio::test]
    async fn test_empty_output_skips_remote() {
        let remote = FakeRemote::new(|| Ok("should not be used".to_string()));
        let summarizer = Summarizer::new(Some(remote.clone()), local(), 150);

        let summary = summarizer.summarize("  \n").await;
        assert!(!summary.is_empty());
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_respects_tiny_budgets() {
        let summarizer = Summarizer::new(None, local(), 10);
        let long = "error: ".to_string() + &"x".repeat(500);
        for input in ["", "short", long.as_str(), OUTPUT] {
            assert!(summarizer.summarize(input).await.chars().count() <= 10);
        }
    }

    #[tokio::test]
    async fn test_any_backend_can_be_the_fallback() {
        let remote = FakeRemote::new(|| Err(RemoteError::Network("offline".into())));
        let fallback = FakeRemote::new(|| Ok("From the fallback.".to_string()));
        let summarizer = Summarizer::new(Some(remote.clone()), fallback.clone(), 150);

        assert_eq!(summarizer.summarize(OUTPUT).await, "From the fallback.");
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_fallback_still_answers() {
        let fallback = FakeRemote::new(|| Err(RemoteError::RateLimited));
        let summarizer = Summarizer::new(None, fallback, 12);
        assert_eq!(summarizer.summarize(OUTPUT).await, "Summary u...");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 8), "hello...");
        assert_eq!(truncate_chars("こんにちは世界", 5), "こん...");
        assert_eq!(truncate_chars("hello", 2), "he");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(RemoteError::AuthInvalid("401".into()).kind(), "auth-invalid");
        assert_eq!(RemoteError::Network("dns".into()).kind(), "network-error");
    }
}
