//! Turn states and the record of one completed round trip.

use serde::Serialize;

use crate::audio::Clip;

/// Where the controller is in the current voice turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    /// Waiting for the microphone to open.
    Arming,
    Recording,
    /// Capture is being stopped and the clip assembled.
    Finalizing,
    Transcribing,
    /// Waiting on the chat runtime's answer.
    Replying,
    Synthesizing,
    Playing,
    /// Transient: the error has been reported and the controller is about
    /// to return to Idle.
    Failed,
}

impl TurnState {
    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Arming => "arming",
            Self::Recording => "recording",
            Self::Finalizing => "finalizing",
            Self::Transcribing => "transcribing",
            Self::Replying => "replying",
            Self::Synthesizing => "synthesizing",
            Self::Playing => "playing",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One full round trip, filled in as the turn progresses.
#[derive(Debug, Clone)]
pub struct VoiceTurn {
    pub id: String,
    pub clip: Clip,
    pub transcript: Option<String>,
    pub reply_text: Option<String>,
    pub synthesized_audio_url: Option<String>,
}

impl VoiceTurn {
    pub fn new(clip: Clip) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            clip,
            transcript: None,
            reply_text: None,
            synthesized_audio_url: None,
        }
    }
}
