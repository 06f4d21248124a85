use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{RemoteError, SummaryBackend};
use crate::config::ApiConfig;
use crate::registry::tail_chars;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Summaries from the Claude Messages API
pub struct AnthropicSummarizer {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    instructions: String,
    max_input_chars: usize,
}

impl AnthropicSummarizer {
    pub fn new(api_key: String, config: &ApiConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            instructions: config.instructions.clone(),
            max_input_chars: config.max_input_chars,
        })
    }

    fn request_body(&self, output: &str) -> Value {
        let text = tail_chars(output, self.max_input_chars);
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{
                "role": "user",
                "content": format!("{}\n\nOutput:\n{}", self.instructions, text),
            }],
        })
    }
}

/// Map a non-success HTTP status onto the failure taxonomy
fn classify_status(status: StatusCode, body: String) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::AuthInvalid(status.to_string()),
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited,
        _ => RemoteError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

/// Pull the generated text out of a Messages API response
fn extract_text(response: &Value) -> Result<String, RemoteError> {
    response["content"]
        .as_array()
        .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
        .map(|text| text.trim().to_string())
        .ok_or_else(|| RemoteError::MalformedResponse("no text content".to_string()))
}

#[async_trait]
impl SummaryBackend for AnthropicSummarizer {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn summarize(&self, output: &str, _max_length: usize) -> Result<String, RemoteError> {
        let start = Instant::now();
        debug!("Summary request: model={}, input_chars={}", self.model, output.chars().count());

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(output))
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;

        let text = extract_text(&raw)?;
        debug!("Summary received in {}ms", start.elapsed().as_millis());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summarizer(max_input_chars: usize) -> AnthropicSummarizer {
        let config = ApiConfig {
            max_input_chars,
            ..ApiConfig::default()
        };
        AnthropicSummarizer::new("sk-test".to_string(), &config).unwrap()
    }

    #[test]
    fn test_request_body_truncates_input_to_latest_chars() {
        let body = summarizer(5).request_body("old stuff NEWER");
        let content = body["messages"][0]["content"].as_str().unwrap();
        assert!(content.ends_with("Output:\nNEWER"));
        assert!(!content.contains("old stuff"));
        assert_eq!(body["max_tokens"], 200);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_extract_text() {
        let response = json!({ "content": [{ "type": "text", "text": "  All tests pass.  " }] });
        assert_eq!(extract_text(&response).unwrap(), "All tests pass.");

        let response = json!({ "content": [] });
        assert!(matches!(extract_text(&response), Err(RemoteError::MalformedResponse(_))));

        let response = json!({ "error": { "message": "boom" } });
        assert!(matches!(extract_text(&response), Err(RemoteError::MalformedResponse(_))));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            RemoteError::AuthInvalid(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            RemoteError::RateLimited
        ));
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, "overloaded".to_string()),
            RemoteError::Api { status: 500, .. }
        ));
    }
}
