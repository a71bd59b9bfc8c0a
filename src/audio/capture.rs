//! Microphone access via cpal.
//!
//! Opens the default (or named) input device at its native rate, down-mixes
//! to mono, resamples to the configured rate, and hands samples to the
//! capture through an SPSC ring buffer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tracing::{error, info};

use super::ring_buffer::{sample_ring, SampleConsumer, DEFAULT_CAPACITY};
use super::{MicStream, Microphone};
use crate::error::VoiceError;

/// List available input device names.
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.input_devices() {
        for dev in devices {
            if let Ok(name) = dev.name() {
                names.push(name);
            }
        }
    }
    names
}

/// List available output device names.
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.output_devices() {
        for dev in devices {
            if let Ok(name) = dev.name() {
                names.push(name);
            }
        }
    }
    names
}

/// cpal-backed [`Microphone`].
#[derive(Debug, Clone)]
pub struct CpalMicrophone {
    device_name: Option<String>,
    target_rate: u32,
}

impl CpalMicrophone {
    pub fn new(device_name: Option<String>, target_rate: u32) -> Self {
        Self {
            device_name,
            target_rate,
        }
    }

    fn resolve_device(&self) -> Result<cpal::Device, VoiceError> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| VoiceError::DeviceUnavailable(format!("cannot enumerate inputs: {e}")))?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| VoiceError::DeviceUnavailable(format!("input device not found: {name}"))),
            None => host
                .default_input_device()
                .ok_or_else(|| VoiceError::DeviceUnavailable("no default input device".into())),
        }
    }
}

impl Microphone for CpalMicrophone {
    fn open(&self) -> Result<Box<dyn MicStream>, VoiceError> {
        let device = self.resolve_device()?;
        let dev_name = device.name().unwrap_or_else(|_| "unknown".into());

        let default_config = device
            .default_input_config()
            .map_err(|e| classify_backend_error(e.to_string()))?;
        let native_rate = default_config.sample_rate().0;
        let channels = default_config.channels();
        let target_rate = self.target_rate;

        let stream_config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(native_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            device = %dev_name,
            native_rate,
            channels,
            target_rate,
            "Opening input device"
        );

        let (mut producer, consumer) = sample_ring(DEFAULT_CAPACITY);
        let needs_resample = native_rate != target_rate;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = to_mono(data, channels);
                    let out = if needs_resample {
                        resample_linear(&mono, native_rate, target_rate)
                    } else {
                        mono
                    };
                    producer.push_slice(&out);
                },
                move |err| {
                    error!("Audio input stream error: {}", err);
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    VoiceError::DeviceUnavailable(format!("{dev_name} is not available"))
                }
                other => classify_backend_error(other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| classify_backend_error(e.to_string()))?;

        Ok(Box::new(CpalStream {
            stream: Some(SendStream(stream)),
            consumer,
            sample_rate: target_rate,
        }))
    }
}

/// cpal::Stream is !Send on some platforms. The stream is built on a
/// blocking-pool thread and then owned by exactly one capture, which pauses
/// and drops it. It is never accessed from two threads at once.
struct SendStream(cpal::Stream);

// Safety: see above; ownership moves between threads but is never shared.
unsafe impl Send for SendStream {}

struct CpalStream {
    stream: Option<SendStream>,
    consumer: SampleConsumer,
    sample_rate: u32,
}

impl MicStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self) -> Vec<f32> {
        self.consumer.drain_all()
    }

    fn release(&mut self) {
        if let Some(SendStream(stream)) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
            info!("Input stream released");
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Backends report a refused microphone as a generic error string.
fn classify_backend_error(message: String) -> VoiceError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        VoiceError::PermissionDenied(message)
    } else {
        VoiceError::DeviceUnavailable(message)
    }
}

/// Linear resampler over mono f32 samples.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || to_rate == 0 {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix interleaved frames to mono by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}
