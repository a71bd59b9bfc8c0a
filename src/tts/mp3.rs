//! MP3 to mono f32 PCM via Symphonia.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::warn;

use crate::error::VoiceError;

/// Decoded mono audio ready for the output device.
#[derive(Debug, Clone)]
pub struct DecodedPcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

pub fn decode_mp3(mp3_bytes: &[u8]) -> Result<DecodedPcm, VoiceError> {
    // MediaSourceStream needs an owned 'static source.
    let cursor = std::io::Cursor::new(mp3_bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VoiceError::PlaybackFailure(format!("MP3 format detection failed: {e}")))?;

    let mut format = detected.format;
    let track = format
        .default_track()
        .ok_or_else(|| VoiceError::PlaybackFailure("no audio track in MP3".into()))?;
    let track_id = track.id;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1)
        .max(1);
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VoiceError::PlaybackFailure(format!("MP3 decoder init failed: {e}")))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                return Err(VoiceError::PlaybackFailure(format!("MP3 decode error: {e}")));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                warn!("MP3 packet decode error (skipping): {}", e);
                continue;
            }
        };
        let signal = *decoded.spec();
        if sample_rate == 0 {
            sample_rate = signal.rate;
        }
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, signal);
        buf.copy_interleaved_ref(decoded);

        if channels == 1 {
            samples.extend_from_slice(buf.samples());
        } else {
            for frame in buf.samples().chunks(channels) {
                samples.push(frame.iter().sum::<f32>() / channels as f32);
            }
        }
    }

    if sample_rate == 0 {
        return Err(VoiceError::PlaybackFailure("MP3 stream has no sample rate".into()));
    }

    Ok(DecodedPcm {
        samples,
        sample_rate,
    })
}
