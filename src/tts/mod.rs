//! Text-to-speech: synthesizing the reply and playing it back.
//!
//! The backend returns MP3; [`mp3`] decodes it to PCM and [`playback`]
//! plays it through rodio.

pub mod http;
pub mod mp3;
pub mod playback;

use async_trait::async_trait;
use base64::Engine as _;

use crate::error::VoiceError;

pub use http::HttpSynthesizer;
pub use playback::RodioSink;

/// Encoded audio of a synthesized reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    mp3: Vec<u8>,
}

impl SynthesizedAudio {
    pub fn new(mp3: Vec<u8>) -> Self {
        Self { mp3 }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mp3
    }

    pub fn is_empty(&self) -> bool {
        self.mp3.is_empty()
    }

    /// A `data:` URL the host UI can hand to an audio element.
    pub fn data_url(&self) -> String {
        format!(
            "data:audio/mpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.mp3)
        )
    }
}

/// Turns reply text into playable audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, VoiceError>;
}

/// Plays synthesized audio to completion.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Resolves when playback finishes naturally or is stopped.
    async fn play(&self, audio: &SynthesizedAudio) -> Result<(), VoiceError>;

    /// Interrupt current playback.
    fn stop(&self);
}
