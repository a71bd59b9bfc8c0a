//! Controller configuration: defaults, validation, and the on-disk JSON file.

pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::VoiceError;
use crate::vad::SilenceConfig;
use paths::get_data_dir;

const CONFIG_FILE: &str = "voice_turn.json";

/// How a finished clip reaches the transcription service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscribeMode {
    /// `POST /upload`, then `POST /transcribe` with the stored name.
    #[default]
    Upload,
    /// Multipart clip straight to `POST /transcribe`.
    Direct,
}

/// voice_turn.json shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceTurnConfig {
    /// Base URL of the speech backend.
    pub backend_url: String,
    pub transcribe_mode: TranscribeMode,
    /// Per-request bound for every network step; `None` waits forever.
    pub request_timeout_ms: Option<u64>,
    pub silence_threshold: f32,
    pub silence_duration_ms: u64,
    /// Hard cap on a single recording.
    pub max_recording_ms: u64,
    /// How often the driver drains the microphone and checks energy.
    pub poll_interval_ms: u64,
    /// Bound on the samples measured per energy reading.
    pub energy_window: usize,
    pub sample_rate: u32,
    pub input_device: Option<String>,
    /// Re-arm capture automatically after playback.
    pub continuous_mode: bool,
    pub playback_volume: f32,
}

impl Default for VoiceTurnConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:4000".into(),
            transcribe_mode: TranscribeMode::Upload,
            request_timeout_ms: Some(30_000),
            silence_threshold: 0.02,
            silence_duration_ms: 2000,
            max_recording_ms: 60_000,
            poll_interval_ms: 100,
            energy_window: 4096,
            sample_rate: 16_000,
            input_device: None,
            continuous_mode: false,
            playback_volume: 1.0,
        }
    }
}

impl VoiceTurnConfig {
    pub fn validate(&self) -> Result<(), VoiceError> {
        let url = self.backend_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(VoiceError::Config(format!(
                "backendUrl must be an http(s) URL, got {:?}",
                self.backend_url
            )));
        }
        if !(self.silence_threshold > 0.0 && self.silence_threshold < 1.0) {
            return Err(VoiceError::Config(format!(
                "silenceThreshold must be in (0, 1), got {}",
                self.silence_threshold
            )));
        }
        if self.silence_duration_ms == 0 {
            return Err(VoiceError::Config("silenceDurationMs must be positive".into()));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms > self.silence_duration_ms {
            return Err(VoiceError::Config(format!(
                "pollIntervalMs must be in 1..={}, got {}",
                self.silence_duration_ms, self.poll_interval_ms
            )));
        }
        if self.max_recording_ms < self.silence_duration_ms {
            return Err(VoiceError::Config(
                "maxRecordingMs must not be shorter than silenceDurationMs".into(),
            ));
        }
        if self.energy_window == 0 {
            return Err(VoiceError::Config("energyWindow must be positive".into()));
        }
        if !(8_000..=48_000).contains(&self.sample_rate) {
            return Err(VoiceError::Config(format!(
                "sampleRate must be between 8000 and 48000, got {}",
                self.sample_rate
            )));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(VoiceError::Config("requestTimeoutMs must be positive or null".into()));
        }
        if !(0.0..=1.0).contains(&self.playback_volume) {
            return Err(VoiceError::Config(format!(
                "playbackVolume must be in [0, 1], got {}",
                self.playback_volume
            )));
        }
        Ok(())
    }

    pub fn silence(&self) -> SilenceConfig {
        SilenceConfig {
            threshold: self.silence_threshold,
            silence_duration: Duration::from_millis(self.silence_duration_ms),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_recording(&self) -> Duration {
        Duration::from_millis(self.max_recording_ms)
    }
}

/// Overlay a partial camelCase JSON object onto `current` and validate the
/// result. Keys absent from `patch` keep their current values.
pub fn merge_config(
    current: &VoiceTurnConfig,
    patch: &serde_json::Value,
) -> Result<VoiceTurnConfig, VoiceError> {
    let serde_json::Value::Object(fields) = patch else {
        return Err(VoiceError::Config("config update must be a JSON object".into()));
    };
    let mut merged = serde_json::to_value(current)
        .map_err(|e| VoiceError::Config(format!("serialize config: {e}")))?;
    if let serde_json::Value::Object(base) = &mut merged {
        for (key, value) in fields {
            base.insert(key.clone(), value.clone());
        }
    }
    let config: VoiceTurnConfig = serde_json::from_value(merged)
        .map_err(|e| VoiceError::Config(format!("invalid config update: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Path to voice_turn.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join(CONFIG_FILE)
}

/// Read the config from the data directory, falling back to defaults.
pub fn read_config() -> VoiceTurnConfig {
    read_config_from(&get_config_path())
}

/// Read and validate a config file. A missing file yields defaults quietly;
/// an unreadable or invalid one yields defaults with a warning.
pub fn read_config_from(path: &Path) -> VoiceTurnConfig {
    let Some(config) = read_json_file::<VoiceTurnConfig>(path) else {
        return VoiceTurnConfig::default();
    };
    match config.validate() {
        Ok(()) => config,
        Err(e) => {
            warn!("Ignoring {}: {}", path.display(), e);
            VoiceTurnConfig::default()
        }
    }
}

/// Persist the config as pretty JSON, creating the directory if needed.
pub fn write_config_to(path: &Path, config: &VoiceTurnConfig) -> Result<(), VoiceError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| VoiceError::Config(format!("create {}: {}", dir.display(), e)))?;
    }
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| VoiceError::Config(format!("serialize config: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| VoiceError::Config(format!("write {}: {}", path.display(), e)))?;
    info!(path = %path.display(), "Configuration saved");
    Ok(())
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
