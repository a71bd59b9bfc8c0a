//! Voice capture and turn-taking controller.
//!
//! Records the user through the microphone until trailing silence, sends the
//! clip to a speech backend for transcription, hands the transcript to a chat
//! runtime, and speaks the reply. See [`turn::TurnController`].

pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod stt;
pub mod tts;
pub mod turn;
pub mod vad;

#[cfg(test)]
mod testing;

pub use error::{ErrorKind, VoiceError};
pub use turn::{Collaborators, TurnController, TurnEvent, TurnState};
