//! Audio playback via rodio.
//!
//! Each `play()` opens the default output device on a blocking thread,
//! queues the decoded reply, and polls until the sink drains or a stop is
//! requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tracing::{debug, info};

use super::mp3::decode_mp3;
use super::{AudioSink, SynthesizedAudio};
use crate::error::VoiceError;

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Plays synthesized MP3 through the default output device.
pub struct RodioSink {
    volume: f32,
    cancel: Arc<AtomicBool>,
}

impl RodioSink {
    pub fn new(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl AudioSink for RodioSink {
    async fn play(&self, audio: &SynthesizedAudio) -> Result<(), VoiceError> {
        let pcm = decode_mp3(audio.bytes())?;
        if pcm.samples.is_empty() {
            return Ok(());
        }

        self.cancel.store(false, Ordering::SeqCst);
        let cancel = Arc::clone(&self.cancel);
        let volume = self.volume;

        info!(
            samples = pcm.samples.len(),
            sample_rate = pcm.sample_rate,
            "Playback start"
        );

        tokio::task::spawn_blocking(move || -> Result<(), VoiceError> {
            let (_stream, handle) = OutputStream::try_default()
                .map_err(|e| VoiceError::PlaybackFailure(format!("open audio output: {e}")))?;
            let sink = Sink::try_new(&handle)
                .map_err(|e| VoiceError::PlaybackFailure(format!("create audio sink: {e}")))?;
            sink.set_volume(volume);
            sink.append(SamplesBuffer::new(1, pcm.sample_rate, pcm.samples));

            while !sink.empty() {
                if cancel.load(Ordering::SeqCst) {
                    sink.stop();
                    debug!("Playback interrupted");
                    break;
                }
                std::thread::sleep(DRAIN_POLL);
            }
            Ok(())
        })
        .await
        .map_err(|e| VoiceError::PlaybackFailure(format!("playback thread failed: {e}")))??;

        info!("Playback end");
        Ok(())
    }

    fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}
