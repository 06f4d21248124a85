use std::process::Stdio;
use tokio::process::Command;

use crate::config::SpeechConfig;

/// Fire-and-forget text-to-speech
pub trait SpeechOutput: Send + Sync {
    fn speak(&self, text: &str);
}

/// Speaks through the macOS `say` command
pub struct SaySpeaker {
    voice: Option<String>,
    rate: u32,
}

impl SaySpeaker {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            voice: config.voice.clone(),
            rate: config.rate,
        }
    }

    fn args(&self, text: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(voice) = &self.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        args.push("-r".to_string());
        args.push(self.rate.to_string());
        // A leading dash would be parsed as an option
        args.push(text.trim_start_matches('-').trim_start().to_string());
        args
    }
}

impl SpeechOutput for SaySpeaker {
    fn speak(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        let spawned = Command::new("say")
            .args(self.args(text))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        if let Err(e) = spawned {
            tracing::warn!("TTS unavailable: {}", e);
        }
    }
}

/// Logs instead of speaking; used when speech is disabled
pub struct SilentSpeaker;

impl SpeechOutput for SilentSpeaker {
    fn speak(&self, text: &str) {
        tracing::debug!("(muted) {}", text);
    }
}
