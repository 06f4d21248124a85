use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc::UnboundedSender;

use crate::actions::Action;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("no recognizer command configured")]
    NotConfigured,

    #[error("could not start recognizer `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("recognizer read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// An external speech recognizer that prints one transcript per line
pub struct CommandRecognizer {
    command: Vec<String>,
}

/// A running recognizer; yields transcripts until the process exits
pub struct TranscriptStream {
    lines: Lines<BufReader<ChildStdout>>,
    _child: Child,
}

impl TranscriptStream {
    /// Next non-empty transcript, or `None` once the recognizer has exited
    pub async fn next_transcript(&mut self) -> Result<Option<String>, SpeechError> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
        Ok(None)
    }
}

impl CommandRecognizer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    /// Start the recognizer. Each call starts a fresh process.
    pub fn listen(&self) -> Result<TranscriptStream, SpeechError> {
        let (program, args) = self.command.split_first().ok_or(SpeechError::NotConfigured)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpeechError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            SpeechError::Read(std::io::Error::other("recognizer stdout unavailable"))
        })?;

        Ok(TranscriptStream {
            lines: BufReader::new(stdout).lines(),
            _child: child,
        })
    }
}

/// Feed transcripts into the action queue, restarting the recognizer whenever it stops.
pub async fn run_listener(
    recognizer: CommandRecognizer,
    tx: UnboundedSender<Action>,
    restart_delay: Duration,
) {
    loop {
        match recognizer.listen() {
            Ok(mut stream) => {
                tracing::info!("Voice recognizer started");
                loop {
                    match stream.next_transcript().await {
                        Ok(Some(transcript)) => {
                            tracing::info!("Heard: {}", transcript);
                            if tx.send(Action::Transcript(transcript)).is_err() {
                                return;
                            }
                        }
                        Ok(None) => {
                            tracing::warn!("Voice recognizer exited, restarting");
                            break;
                        }
                        Err(e) => {
                            let _ = tx.send(Action::Error(format!("Voice: {}", e)));
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Voice capture unavailable: {}", e);
                if tx.send(Action::Error(format!("Voice: {}", e))).is_err() {
                    return;
                }
            }
        }

        tokio::time::sleep(restart_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_yields_non_empty_lines() {
        let recognizer = CommandRecognizer::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "printf 'タブ3\\n\\n  summarize  \\n'".to_string(),
        ]);

        let mut stream = recognizer.listen().unwrap();
        assert_eq!(stream.next_transcript().await.unwrap().as_deref(), Some("タブ3"));
        assert_eq!(stream.next_transcript().await.unwrap().as_deref(), Some("summarize"));
        assert_eq!(stream.next_transcript().await.unwrap(), None);
    }

    #[test]
    fn test_empty_command_is_not_configured() {
        let recognizer = CommandRecognizer::new(Vec::new());
        assert!(matches!(recognizer.listen(), Err(SpeechError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_listener_reports_missing_program_and_retries() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let recognizer = CommandRecognizer::new(vec!["voicedeck-no-such-recognizer".to_string()]);

        let handle = tokio::spawn(run_listener(recognizer, tx, Duration::from_millis(10)));

        for _ in 0..2 {
            match rx.recv().await {
                Some(Action::Error(msg)) => assert!(msg.starts_with("Voice:")),
                other => panic!("unexpected {:?}", other),
            }
        }
        handle.abort();
    }
}
