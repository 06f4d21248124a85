mod interpret;
mod listener;
mod speech;

pub use interpret::{Interpreter, VoiceIntent};
pub use listener::{run_listener, CommandRecognizer};
pub use speech::{SaySpeaker, SilentSpeaker, SpeechOutput};

use std::sync::Arc;

use crate::config::SpeechConfig;

pub fn speaker_for(config: &SpeechConfig) -> Arc<dyn SpeechOutput> {
    if config.enabled {
        Arc::new(SaySpeaker::new(config))
    } else {
        Arc::new(SilentSpeaker)
    }
}
