use log::info;
use std::path::Path;
use tourcore::interface::{AudioSink, PlaybackSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Nothing to play.
    Disabled,
    Playing,
    Paused,
}

/// Console stand-in for the tour audio widget.
#[derive(Debug)]
pub struct MediaPlayer {
    source: Option<String>,
    last_token: u64,
    state: PlayerState,
    starts: usize,
}

impl Default for MediaPlayer {
    fn default() -> Self {
        Self {
            source: None,
            last_token: 0,
            state: PlayerState::Disabled,
            starts: 0,
        }
    }
}

impl MediaPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// How many times playback was started from the beginning.
    pub fn starts(&self) -> usize {
        self.starts
    }

    /// Last path segment of the current source.
    pub fn display_name(&self) -> Option<String> {
        let source = self.source.as_deref()?;
        Path::new(source)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .or_else(|| Some(source.to_string()))
    }

    pub fn toggle_pause(&mut self) {
        self.state = match self.state {
            PlayerState::Playing => PlayerState::Paused,
            PlayerState::Paused => PlayerState::Playing,
            PlayerState::Disabled => PlayerState::Disabled,
        };
    }
}

impl AudioSink for MediaPlayer {
    fn sync(&mut self, signal: &PlaybackSignal) {
        if signal.token == self.last_token {
            return;
        }
        self.last_token = signal.token;
        match signal.path.as_deref().filter(|path| !path.is_empty()) {
            Some(path) => {
                self.source = Some(path.to_string());
                self.state = PlayerState::Playing;
                self.starts += 1;
                info!(
                    "playing {}",
                    self.display_name().unwrap_or_else(|| path.to_string())
                );
            }
            None => {
                self.source = None;
                self.state = PlayerState::Disabled;
            }
        }
    }
}
