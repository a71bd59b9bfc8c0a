//! IPC protocol types for talking to the host UI.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (voice-turn -> host).
//! Commands use `{"command": "<name>", ...}` format (host -> voice-turn).

pub mod bridge;
pub mod host;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::turn::{TurnEvent, TurnState};

// ---------------------------------------------------------------------------
// Events: voice-turn -> host (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the host via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum VoiceEvent {
    Starting {},
    Ready {},
    Pong {},
    StateChange {
        state: TurnState,
    },
    Transcription {
        #[serde(rename = "turnId")]
        turn_id: String,
        text: String,
    },
    /// Ask the host's chat runtime to answer a transcript.
    UserReply {
        #[serde(rename = "requestId")]
        request_id: String,
        text: String,
    },
    Response {
        #[serde(rename = "turnId")]
        turn_id: String,
        text: String,
    },
    SpeakingStart {
        #[serde(rename = "turnId")]
        turn_id: String,
        #[serde(rename = "audioUrl")]
        audio_url: String,
    },
    SpeakingEnd {
        #[serde(rename = "turnId")]
        turn_id: String,
    },
    TurnComplete {
        #[serde(rename = "turnId")]
        turn_id: String,
    },
    TurnCancelled {},
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<ErrorKind>,
    },
    AudioDevices {
        input: Vec<AudioDeviceInfo>,
        output: Vec<AudioDeviceInfo>,
    },
    ConfigUpdated {
        config: serde_json::Value,
    },
    Stopping {},
}

impl From<TurnEvent> for VoiceEvent {
    fn from(event: TurnEvent) -> Self {
        match event {
            TurnEvent::StateChanged { state } => Self::StateChange { state },
            TurnEvent::Transcript { turn_id, text } => Self::Transcription { turn_id, text },
            TurnEvent::Reply { turn_id, text } => Self::Response { turn_id, text },
            TurnEvent::SpeakingStarted { turn_id, audio_url } => {
                Self::SpeakingStart { turn_id, audio_url }
            }
            TurnEvent::SpeakingEnded { turn_id } => Self::SpeakingEnd { turn_id },
            TurnEvent::Completed { turn_id } => Self::TurnComplete { turn_id },
            TurnEvent::Failed { kind, message } => Self::Error {
                message,
                kind: Some(kind),
            },
            TurnEvent::Cancelled => Self::TurnCancelled {},
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub id: i32,
    pub name: String,
}

impl AudioDeviceInfo {
    /// Number device names in enumeration order.
    pub fn from_names(names: Vec<String>) -> Vec<Self> {
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Self {
                id: i as i32,
                name,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Commands: host -> voice-turn (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the host via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum VoiceCommand {
    Ping {},
    BeginTurn {},
    StopRecording {},
    PauseRecording {},
    ResumeRecording {},
    CancelTurn {},
    /// The chat runtime's answer to a `user_reply` event.
    ChatReply {
        text: String,
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    ChatError {
        message: String,
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    ConfigUpdate {
        #[serde(default)]
        config: serde_json::Value,
    },
    ListAudioDevices {},
    GetState {},
    Stop {},
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let ev = VoiceEvent::Transcription {
            turn_id: "t1".into(),
            text: "hello".into(),
        };
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({"event": "transcription", "data": {"turnId": "t1", "text": "hello"}})
        );

        let ev = VoiceEvent::StateChange {
            state: TurnState::Transcribing,
        };
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({"event": "state_change", "data": {"state": "transcribing"}})
        );

        assert_eq!(
            serde_json::to_value(VoiceEvent::Ready {}).unwrap(),
            json!({"event": "ready", "data": {}})
        );
    }

    #[test]
    fn test_failed_turn_becomes_error_event_with_kind() {
        let ev: VoiceEvent = TurnEvent::Failed {
            kind: ErrorKind::NetworkFailure,
            message: "network failure: 500".into(),
        }
        .into();
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({"event": "error", "data": {"message": "network failure: 500", "kind": "network_failure"}})
        );

        let plain = VoiceEvent::Error {
            message: "bad".into(),
            kind: None,
        };
        assert_eq!(
            serde_json::to_value(&plain).unwrap(),
            json!({"event": "error", "data": {"message": "bad"}})
        );
    }

    #[test]
    fn test_cancel_maps_to_turn_cancelled() {
        let ev: VoiceEvent = TurnEvent::Cancelled.into();
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({"event": "turn_cancelled", "data": {}})
        );
    }

    #[test]
    fn test_parse_commands() {
        let cmd: VoiceCommand = serde_json::from_str(r#"{"command":"begin_turn"}"#).unwrap();
        assert!(matches!(cmd, VoiceCommand::BeginTurn {}));

        let cmd: VoiceCommand =
            serde_json::from_str(r#"{"command":"chat_reply","text":"hi","requestId":"r1"}"#)
                .unwrap();
        match cmd {
            VoiceCommand::ChatReply { text, request_id } => {
                assert_eq!(text, "hi");
                assert_eq!(request_id.as_deref(), Some("r1"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let cmd: VoiceCommand =
            serde_json::from_str(r#"{"command":"chat_error","message":"offline"}"#).unwrap();
        assert!(matches!(cmd, VoiceCommand::ChatError { request_id: None, .. }));

        let cmd: VoiceCommand = serde_json::from_str(r#"{"command":"config_update"}"#).unwrap();
        assert!(matches!(cmd, VoiceCommand::ConfigUpdate { config } if config.is_null()));

        assert!(serde_json::from_str::<VoiceCommand>(r#"{"command":"launch_rockets"}"#).is_err());
    }

    #[test]
    fn test_device_info_numbering() {
        let devices = AudioDeviceInfo::from_names(vec!["a".into(), "b".into()]);
        assert_eq!(devices[1], AudioDeviceInfo { id: 1, name: "b".into() });
    }
}
