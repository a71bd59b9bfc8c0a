//! Capture session states.

use serde::Serialize;

/// Lifecycle of a single microphone acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// No stream has been opened yet.
    Idle,
    /// Stream open, chunks are being appended.
    Recording,
    /// Stream open, appending is on hold until resumed.
    Paused,
    /// Finalized or cancelled. The stream has been released.
    Stopped,
}

impl CaptureState {
    /// Whether the microphone is currently held by this session.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Recording => write!(f, "recording"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
