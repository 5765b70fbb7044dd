use serde::{Deserialize, Serialize};

/// Request to play a clip. `token` increases on every request, so the same
/// path can be replayed from the start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSignal {
    pub path: Option<String>,
    pub token: u64,
}

impl PlaybackSignal {
    pub fn trigger(&mut self, path: impl Into<String>) {
        self.path = Some(path.into());
        self.token += 1;
    }
}

/// Receiver of playback signals, typically a small audio widget.
pub trait AudioSink {
    /// Called with the current signal; implementations restart playback
    /// whenever the token differs from the last one they saw.
    fn sync(&mut self, signal: &PlaybackSignal);
}
