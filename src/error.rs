//! Error types for capture, the speech backend, and the turn controller.

use serde::Serialize;

use crate::audio::CaptureState;

/// Errors surfaced by the voice core.
///
/// Every variant that can end a turn maps onto an [`ErrorKind`] so the host
/// can render it without string matching.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Microphone access was refused by the user or the OS.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable capture device.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Upload, transcription, chat reply, or synthesis failed or timed out.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// `begin_turn` was called while a turn was already running.
    #[error("a voice turn is already in progress")]
    TurnInProgress,

    /// The synthesized audio could not be decoded or played.
    #[error("playback failure: {0}")]
    PlaybackFailure(String),

    /// A capture operation was requested from a state that does not allow it.
    #[error("cannot {op} while capture is {state}")]
    InvalidCaptureState {
        state: CaptureState,
        op: &'static str,
    },

    /// Configuration could not be parsed, validated, or written.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Serializable classification of a [`VoiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    NetworkFailure,
    TurnInProgress,
    PlaybackFailure,
    InvalidCaptureState,
    Config,
}

impl VoiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            Self::NetworkFailure(_) => ErrorKind::NetworkFailure,
            Self::TurnInProgress => ErrorKind::TurnInProgress,
            Self::PlaybackFailure(_) => ErrorKind::PlaybackFailure,
            Self::InvalidCaptureState { .. } => ErrorKind::InvalidCaptureState,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<reqwest::Error> for VoiceError {
    fn from(e: reqwest::Error) -> Self {
        Self::NetworkFailure(e.to_string())
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PermissionDenied => "permission_denied",
            Self::DeviceUnavailable => "device_unavailable",
            Self::NetworkFailure => "network_failure",
            Self::TurnInProgress => "turn_in_progress",
            Self::PlaybackFailure => "playback_failure",
            Self::InvalidCaptureState => "invalid_capture_state",
            Self::Config => "config",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&VoiceError::TurnInProgress.kind()).unwrap();
        assert_eq!(json, "\"turn_in_progress\"");
    }

    #[test]
    fn test_invalid_state_message() {
        let err = VoiceError::InvalidCaptureState {
            state: CaptureState::Idle,
            op: "pause",
        };
        assert_eq!(err.to_string(), "cannot pause while capture is idle");
        assert_eq!(err.kind(), ErrorKind::InvalidCaptureState);
    }
}
