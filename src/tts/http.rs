//! Speech synthesis over the backend's `/audio` endpoint.
//!
//! POST `{base}/audio`
//! Body: `{"transcript": "text to speak"}`
//! Returns base64-encoded MP3.

use async_trait::async_trait;
use base64::Engine as _;
use tracing::info;

use super::{SynthesizedAudio, Synthesizer};
use crate::error::VoiceError;
use crate::stt::http::read_success_body;

pub struct HttpSynthesizer {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, VoiceError> {
        info!(text_len = text.len(), "Synthesis request");

        let resp = self
            .client
            .post(format!("{}/audio", self.base_url))
            .json(&serde_json::json!({ "transcript": text }))
            .send()
            .await?;
        let body = read_success_body(resp, "audio").await?;
        let mp3 = decode_audio_body(&body)?;

        info!(bytes = mp3.len(), "Synthesis complete");
        Ok(SynthesizedAudio::new(mp3))
    }
}

/// Accepts bare base64, a JSON string of it, or a `data:` URL.
fn decode_audio_body(body: &str) -> Result<Vec<u8>, VoiceError> {
    let mut payload = body.trim();
    if payload.len() >= 2 && payload.starts_with('"') && payload.ends_with('"') {
        payload = &payload[1..payload.len() - 1];
    }
    if payload.starts_with("data:") {
        payload = payload
            .split_once(',')
            .map(|(_, data)| data)
            .unwrap_or_default();
    }
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(VoiceError::NetworkFailure("audio response was empty".into()));
    }
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| VoiceError::NetworkFailure(format!("audio response is not base64: {e}")))
}
