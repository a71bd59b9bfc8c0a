//! Speech-to-text: getting a finished clip transcribed by the backend.

pub mod http;

use async_trait::async_trait;

use crate::audio::Clip;
use crate::error::VoiceError;

pub use http::HttpTranscriber;

/// Turns a finalized clip into a transcript.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, clip: &Clip) -> Result<String, VoiceError>;
}
