use crossterm::event::KeyEvent;

use crate::dispatcher::SummaryOutcome;
use crate::registry::Capture;

/// Actions that can be dispatched through the application
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// A poll cycle finished reading every session
    Polled(Vec<Capture>),
    /// The speech recognizer produced a transcript
    Transcript(String),
    /// A summarization job finished
    SummaryReady(SummaryOutcome),
    /// An error occurred
    Error(String),
    /// Request to quit the application
    Quit,
}
