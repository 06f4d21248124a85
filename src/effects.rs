//! Carries out dispatcher effects against the external collaborators.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::actions::Action;
use crate::dispatcher::{Effect, SummaryOutcome};
use crate::summarizer::Summarizer;
use crate::terminal::{SessionBackend, SessionId};
use crate::voice::SpeechOutput;

/// Terminal automation performed in order by a single worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationCommand {
    Activate(SessionId),
    Inject { id: SessionId, text: String },
}

/// Start the worker that applies automation commands one at a time, so that
/// injected text arrives in the order the intents were given.
pub fn spawn_automation_worker(
    backend: Arc<dyn SessionBackend>,
    tx: UnboundedSender<Action>,
) -> UnboundedSender<AutomationCommand> {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<AutomationCommand>();

    tokio::spawn(async move {
        while let Some(command) = cmd_rx.recv().await {
            let result = match &command {
                AutomationCommand::Activate(id) => backend.activate(*id).await,
                AutomationCommand::Inject { id, text } => backend.inject_text(*id, text).await,
            };
            if let Err(e) = result {
                tracing::warn!("{:?} failed: {}", command, e);
                let _ = tx.send(Action::Error(format!("{}: {}", backend.name(), e)));
            }
        }
    });

    cmd_tx
}

pub struct EffectRunner {
    automation: UnboundedSender<AutomationCommand>,
    summarizer: Arc<Summarizer>,
    speaker: Arc<dyn SpeechOutput>,
    refresh: Arc<Notify>,
    tx: UnboundedSender<Action>,
    /// In-flight summary per session
    jobs: HashMap<SessionId, JoinHandle<()>>,
}

impl EffectRunner {
    pub fn new(
        automation: UnboundedSender<AutomationCommand>,
        summarizer: Arc<Summarizer>,
        speaker: Arc<dyn SpeechOutput>,
        refresh: Arc<Notify>,
        tx: UnboundedSender<Action>,
    ) -> Self {
        Self {
            automation,
            summarizer,
            speaker,
            refresh,
            tx,
            jobs: HashMap::new(),
        }
    }

    /// Run one effect. Returns an error message for the status board, if any.
    pub fn run(&mut self, effect: Effect) -> Option<String> {
        self.jobs.retain(|_, job| !job.is_finished());

        match effect {
            Effect::Activate(id) => self.automate(AutomationCommand::Activate(id)),
            Effect::Inject { id, text } => self.automate(AutomationCommand::Inject { id, text }),
            Effect::Summarize(request) => {
                if let Some(previous) = self.jobs.remove(&request.id) {
                    previous.abort();
                }

                let summarizer = self.summarizer.clone();
                let tx = self.tx.clone();
                let id = request.id;
                let job = tokio::spawn(async move {
                    let text = summarizer.summarize(&request.output).await;
                    let _ = tx.send(Action::SummaryReady(SummaryOutcome {
                        id: request.id,
                        incarnation: request.incarnation,
                        purpose: request.purpose,
                        text,
                    }));
                });
                self.jobs.insert(id, job);
                None
            }
            Effect::CancelSummaries(ids) => {
                for id in ids {
                    if let Some(job) = self.jobs.remove(&id) {
                        tracing::debug!("Abandoning summary for {}", id);
                        job.abort();
                    }
                }
                None
            }
            Effect::Speak(text) => {
                self.speaker.speak(&text);
                None
            }
            Effect::Refresh => {
                self.refresh.notify_one();
                None
            }
            Effect::CopyToClipboard(text) => match arboard::Clipboard::new() {
                Ok(mut clipboard) => clipboard
                    .set_text(text)
                    .err()
                    .map(|e| format!("Clipboard error: {}", e)),
                Err(e) => Some(format!("Clipboard error: {}", e)),
            },
            Effect::Notify(notice) => {
                tracing::debug!("Notice reached the runner: {}", notice.message);
                None
            }
        }
    }

    fn automate(&self, command: AutomationCommand) -> Option<String> {
        self.automation
            .send(command)
            .err()
            .map(|_| "Terminal automation stopped".to_string())
    }
}
