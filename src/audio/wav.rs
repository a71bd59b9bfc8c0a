//! PCM encoding and the RIFF/WAV container used for uploads.

/// Convert f32 samples in [-1, 1] to 16-bit little-endian PCM bytes.
pub fn pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let pcm = (clamped * 32767.0) as i16;
        buf.extend_from_slice(&pcm.to_le_bytes());
    }
    buf
}

/// Wrap 16-bit PCM bytes in a 44-byte canonical WAV header.
pub fn wrap_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bytes_per_sample: u16 = 2;
    let data_size = pcm.len() as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + pcm.len());

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * channels as u32 * bytes_per_sample as u32;
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    let block_align = channels * bytes_per_sample;
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&(bytes_per_sample * 8).to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    buf.extend_from_slice(pcm);

    buf
}
