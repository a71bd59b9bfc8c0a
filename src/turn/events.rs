//! Events broadcast by the controller to whoever hosts it.

use serde::Serialize;

use super::state::TurnState;
use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    StateChanged {
        state: TurnState,
    },
    Transcript {
        turn_id: String,
        text: String,
    },
    Reply {
        turn_id: String,
        text: String,
    },
    SpeakingStarted {
        turn_id: String,
        audio_url: String,
    },
    SpeakingEnded {
        turn_id: String,
    },
    Completed {
        turn_id: String,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
    Cancelled,
}
