//! Transcription over the backend's `/upload` and `/transcribe` endpoints.

use async_trait::async_trait;
use reqwest::multipart;
use tracing::{debug, info};

use super::Transcriber;
use crate::audio::Clip;
use crate::config::TranscribeMode;
use crate::error::VoiceError;

pub struct HttpTranscriber {
    base_url: String,
    mode: TranscribeMode,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(base_url: &str, mode: TranscribeMode) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            mode,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn clip_form(clip: &Clip, name: &str) -> Result<multipart::Form, VoiceError> {
        let file_part = multipart::Part::bytes(clip.to_wav())
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        Ok(multipart::Form::new()
            .part("file", file_part)
            .text("name", name.to_string()))
    }

    /// Store the clip; returns the name the backend filed it under.
    pub async fn upload(&self, clip: &Clip, name: &str) -> Result<String, VoiceError> {
        debug!(bytes = clip.pcm().len(), name, "Uploading clip");
        let resp = self
            .client
            .post(self.url("/upload"))
            .header("Accept", "application/json")
            .multipart(Self::clip_form(clip, name)?)
            .send()
            .await?;
        let body = read_success_body(resp, "upload").await?;
        Ok(parse_stored_name(&body).unwrap_or_else(|| name.to_string()))
    }

    /// Ask for the transcript of a previously uploaded clip.
    pub async fn transcribe_stored(&self, filename: &str) -> Result<String, VoiceError> {
        let resp = self
            .client
            .post(self.url("/transcribe"))
            .json(&serde_json::json!({ "filename": filename }))
            .send()
            .await?;
        let body = read_success_body(resp, "transcribe").await?;
        Ok(parse_transcript(&body))
    }

    /// Send the clip itself to `/transcribe`.
    pub async fn transcribe_direct(&self, clip: &Clip, name: &str) -> Result<String, VoiceError> {
        let resp = self
            .client
            .post(self.url("/transcribe"))
            .multipart(Self::clip_form(clip, name)?)
            .send()
            .await?;
        let body = read_success_body(resp, "transcribe").await?;
        Ok(parse_transcript(&body))
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, clip: &Clip) -> Result<String, VoiceError> {
        let name = format!("{}.wav", uuid::Uuid::new_v4());
        let transcript = match self.mode {
            TranscribeMode::Upload => {
                let stored = self.upload(clip, &name).await?;
                self.transcribe_stored(&stored).await?
            }
            TranscribeMode::Direct => self.transcribe_direct(clip, &name).await?,
        };
        info!(chars = transcript.len(), "Transcript received");
        Ok(transcript)
    }
}

/// Read the body of a 2xx response, or turn anything else into a
/// `NetworkFailure` carrying status and body.
pub(crate) async fn read_success_body(
    resp: reqwest::Response,
    step: &str,
) -> Result<String, VoiceError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(VoiceError::NetworkFailure(format!(
            "{step} returned {status}: {body}"
        )));
    }
    Ok(resp.text().await?)
}

/// The upload response names the stored object in one of several shapes.
fn parse_stored_name(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::String(s)) => Some(s),
        Ok(serde_json::Value::Object(obj)) => ["filename", "name", "id"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string),
        Ok(_) => None,
        Err(_) => Some(trimmed.to_string()),
    }
}

/// Transcripts arrive as plain text, a JSON string, or `{"text": ...}`.
fn parse_transcript(body: &str) -> String {
    let trimmed = body.trim();
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::String(s)) => s.trim().to_string(),
        Ok(serde_json::Value::Object(obj)) => ["text", "transcript"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
            .unwrap_or("")
            .trim()
            .to_string(),
        _ => trimmed.to_string(),
    }
}
