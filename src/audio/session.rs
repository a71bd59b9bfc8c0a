//! Capture session and the clip it finalizes into.
//!
//! [`AudioCapture`] is the only owner of the microphone stream. It opens the
//! stream on `start()` and releases it on `stop()`, `cancel()`, or drop,
//! whichever comes first.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::state::CaptureState;
use super::wav::{pcm16_bytes, wrap_wav};
use super::{MicStream, Microphone};
use crate::error::VoiceError;

/// One microphone acquisition: state, start time, and the ordered chunks
/// appended while recording.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    state: CaptureState,
    started_at: DateTime<Utc>,
    chunks: Vec<Vec<u8>>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            started_at: Utc::now(),
            chunks: Vec::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Total bytes captured so far.
    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Append a chunk. Ignored unless the session is recording.
    pub fn append(&mut self, chunk: Vec<u8>) -> bool {
        if self.state != CaptureState::Recording || chunk.is_empty() {
            return false;
        }
        self.chunks.push(chunk);
        true
    }

    /// Concatenate all chunks in arrival order.
    pub fn concat(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    fn set_state(&mut self, state: CaptureState) {
        self.state = state;
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Finalized recording: 16-bit little-endian PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    pcm: Vec<u8>,
    sample_rate: u32,
    channels: u16,
}

impl Clip {
    pub fn new(pcm: Vec<u8>, sample_rate: u32, channels: u16) -> Self {
        Self {
            pcm,
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn pcm(&self) -> &[u8] {
        &self.pcm
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn duration(&self) -> Duration {
        let frame_bytes = 2 * self.channels as u64;
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = self.pcm.len() as u64 / frame_bytes;
        Duration::from_millis(frames * 1000 / self.sample_rate as u64)
    }

    /// The clip wrapped in a WAV container, as sent to the backend.
    pub fn to_wav(&self) -> Vec<u8> {
        wrap_wav(&self.pcm, self.sample_rate, self.channels)
    }
}

/// Owns the microphone stream and the current [`CaptureSession`].
pub struct AudioCapture {
    mic: Arc<dyn Microphone>,
    stream: Option<Box<dyn MicStream>>,
    session: CaptureSession,
    sample_rate: u32,
    clip: Option<Clip>,
}

impl AudioCapture {
    pub fn new(mic: Arc<dyn Microphone>) -> Self {
        Self {
            mic,
            stream: None,
            session: CaptureSession::new(),
            sample_rate: 0,
            clip: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.session.state()
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// Open the microphone and begin recording.
    pub fn start(&mut self) -> Result<&CaptureSession, VoiceError> {
        let state = self.session.state();
        if state != CaptureState::Idle {
            return Err(VoiceError::InvalidCaptureState { state, op: "start" });
        }

        let stream = self.mic.open()?;
        Ok(self.begin(stream))
    }

    /// Like [`start`](Self::start), but opens the device on the blocking pool.
    /// Device enumeration and OS permission prompts can block for seconds.
    pub async fn start_async(&mut self) -> Result<&CaptureSession, VoiceError> {
        let state = self.session.state();
        if state != CaptureState::Idle {
            return Err(VoiceError::InvalidCaptureState { state, op: "start" });
        }

        let mic = Arc::clone(&self.mic);
        let stream = tokio::task::spawn_blocking(move || mic.open())
            .await
            .map_err(|e| VoiceError::DeviceUnavailable(format!("device open task failed: {e}")))??;
        Ok(self.begin(stream))
    }

    fn begin(&mut self, stream: Box<dyn MicStream>) -> &CaptureSession {
        self.sample_rate = stream.sample_rate();
        self.stream = Some(stream);
        self.session = CaptureSession::new();
        self.session.set_state(CaptureState::Recording);

        info!(sample_rate = self.sample_rate, "Capture started");
        &self.session
    }

    /// Drain audio produced since the last poll.
    ///
    /// The frame is appended to the session only while recording, but it is
    /// returned in both live states so energy can still be measured on hold.
    pub fn poll(&mut self) -> Option<Vec<f32>> {
        let stream = self.stream.as_mut()?;
        let frame = stream.read();
        if frame.is_empty() {
            return None;
        }
        if self.session.state() == CaptureState::Recording {
            self.session.append(pcm16_bytes(&frame));
        }
        Some(frame)
    }

    /// Append a frame that was drained earlier, e.g. the one that ended a
    /// hold. Ignored unless recording.
    pub fn push_frame(&mut self, frame: &[f32]) -> bool {
        self.session.append(pcm16_bytes(frame))
    }

    pub fn pause(&mut self) -> Result<(), VoiceError> {
        self.transition(CaptureState::Recording, CaptureState::Paused, "pause")
    }

    pub fn resume(&mut self) -> Result<(), VoiceError> {
        self.transition(CaptureState::Paused, CaptureState::Recording, "resume")
    }

    /// Finalize the session and release the microphone.
    ///
    /// Calling this again returns the same clip without touching the stream.
    pub fn stop(&mut self) -> Result<Clip, VoiceError> {
        match self.session.state() {
            CaptureState::Recording | CaptureState::Paused => {
                if self.session.state() == CaptureState::Recording {
                    // Pick up the tail still sitting in the stream buffer.
                    let _ = self.poll();
                }
                self.session.set_state(CaptureState::Stopped);
                self.release_stream();

                let clip = Clip::new(self.session.concat(), self.sample_rate, 1);
                info!(
                    chunks = self.session.chunks().len(),
                    bytes = clip.pcm().len(),
                    duration_ms = clip.duration().as_millis() as u64,
                    "Capture stopped"
                );
                self.clip = Some(clip.clone());
                Ok(clip)
            }
            CaptureState::Stopped => self.clip.clone().ok_or(VoiceError::InvalidCaptureState {
                state: CaptureState::Stopped,
                op: "stop",
            }),
            CaptureState::Idle => Err(VoiceError::InvalidCaptureState {
                state: CaptureState::Idle,
                op: "stop",
            }),
        }
    }

    /// Release the microphone and discard the session without a clip.
    pub fn cancel(&mut self) {
        if self.session.state().is_live() {
            debug!("Capture cancelled");
        }
        self.release_stream();
        self.session.set_state(CaptureState::Stopped);
    }

    fn transition(
        &mut self,
        from: CaptureState,
        to: CaptureState,
        op: &'static str,
    ) -> Result<(), VoiceError> {
        let state = self.session.state();
        if state != from {
            return Err(VoiceError::InvalidCaptureState { state, op });
        }
        self.session.set_state(to);
        debug!(from = %from, to = %to, "Capture state change");
        Ok(())
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if self.stream.is_some() {
            warn!(state = %self.session.state(), "Capture dropped while live, releasing microphone");
            self.release_stream();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMicrophone;

    fn capture_with(mic: &Arc<FakeMicrophone>) -> AudioCapture {
        AudioCapture::new(mic.clone() as Arc<dyn Microphone>)
    }

    #[test]
    fn test_session_concat_in_arrival_order() {
        let mut session = CaptureSession::new();
        session.set_state(CaptureState::Recording);
        session.append(vec![1, 2]);
        session.append(vec![3]);
        session.append(vec![4, 5, 6]);
        assert_eq!(session.concat(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(session.byte_len(), 6);
    }

    #[test]
    fn test_session_ignores_append_unless_recording() {
        let mut session = CaptureSession::new();
        assert!(!session.append(vec![1]));
        session.set_state(CaptureState::Paused);
        assert!(!session.append(vec![1]));
        assert!(session.chunks().is_empty());
    }

    #[test]
    fn test_clip_is_concatenation_of_polled_frames() {
        let c1 = vec![0.1f32, 0.2];
        let c2 = vec![-0.3f32];
        let c3 = vec![0.4f32, 0.5, -0.6];
        let mic = FakeMicrophone::scripted(vec![c1.clone(), c2.clone(), c3.clone()]);
        let mut capture = capture_with(&mic);
        capture.start().unwrap();
        assert!(capture.poll().is_some());
        assert!(capture.poll().is_some());
        assert!(capture.poll().is_some());
        let clip = capture.stop().unwrap();

        let mut expected = pcm16_bytes(&c1);
        expected.extend(pcm16_bytes(&c2));
        expected.extend(pcm16_bytes(&c3));
        assert_eq!(clip.pcm(), &expected[..]);
        assert_eq!(clip.sample_rate(), 16_000);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mic = FakeMicrophone::scripted(vec![vec![0.5; 4]]);
        let mut capture = capture_with(&mic);
        capture.start().unwrap();
        capture.poll();
        let first = capture.stop().unwrap();
        let second = capture.stop().unwrap();
        assert_eq!(first, second);
        assert_eq!(capture.state(), CaptureState::Stopped);
        assert_eq!(mic.opens(), 1);
        assert_eq!(mic.releases(), 1);
    }

    #[test]
    fn test_paused_frames_are_not_appended() {
        let mic = FakeMicrophone::scripted(vec![vec![0.5; 2], vec![0.7; 2], vec![0.9; 2]]);
        let mut capture = capture_with(&mic);
        capture.start().unwrap();
        capture.poll();
        capture.pause().unwrap();
        assert_eq!(capture.poll(), Some(vec![0.7; 2]));
        capture.resume().unwrap();
        capture.poll();
        let clip = capture.stop().unwrap();

        let mut expected = pcm16_bytes(&[0.5; 2]);
        expected.extend(pcm16_bytes(&[0.9; 2]));
        assert_eq!(clip.pcm(), &expected[..]);
    }

    #[test]
    fn test_invalid_transitions() {
        let mic = FakeMicrophone::scripted(vec![]);
        let mut capture = capture_with(&mic);
        assert!(matches!(
            capture.pause(),
            Err(VoiceError::InvalidCaptureState { op: "pause", .. })
        ));
        assert!(capture.stop().is_err());
        capture.start().unwrap();
        assert!(capture.resume().is_err());
        assert!(capture.start().is_err());
        assert_eq!(mic.opens(), 1);
    }

    #[test]
    fn test_permission_denied_leaves_capture_idle() {
        let mic = FakeMicrophone::denied();
        let mut capture = capture_with(&mic);
        assert!(matches!(
            capture.start(),
            Err(VoiceError::PermissionDenied(_))
        ));
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(mic.releases(), 0);
    }

    #[test]
    fn test_drop_releases_live_stream() {
        let mic = FakeMicrophone::scripted(vec![]);
        {
            let mut capture = capture_with(&mic);
            capture.start().unwrap();
        }
        assert_eq!(mic.releases(), 1);
    }

    #[test]
    fn test_cancel_releases_once_and_has_no_clip() {
        let mic = FakeMicrophone::scripted(vec![vec![0.2; 8]]);
        let mut capture = capture_with(&mic);
        capture.start().unwrap();
        capture.poll();
        capture.cancel();
        capture.cancel();
        assert_eq!(mic.releases(), 1);
        assert!(capture.stop().is_err());
    }

    #[test]
    fn test_clip_duration() {
        let clip = Clip::new(vec![0; 32_000], 16_000, 1);
        assert_eq!(clip.duration(), Duration::from_secs(1));
        assert_eq!(clip.to_wav().len(), 32_044);
    }

    #[test]
    fn test_push_frame_only_while_recording() {
        let mic = FakeMicrophone::scripted(vec![vec![0.5; 2]]);
        let mut capture = capture_with(&mic);
        assert!(!capture.push_frame(&[0.1; 2]));
        capture.start().unwrap();
        capture.pause().unwrap();
        let held = capture.poll().unwrap();
        assert!(!capture.push_frame(&held));
        capture.resume().unwrap();
        assert!(capture.push_frame(&held));
        assert_eq!(capture.stop().unwrap().pcm(), &pcm16_bytes(&[0.5; 2])[..]);
    }

    #[tokio::test]
    async fn test_start_async_opens_off_the_runtime() {
        let mic = FakeMicrophone::scripted(vec![vec![0.25; 4]]);
        let mut capture = capture_with(&mic);
        let session = capture.start_async().await.unwrap();
        assert_eq!(session.state(), CaptureState::Recording);
        assert!(capture.start_async().await.is_err());
        assert_eq!(mic.opens(), 1);
        capture.poll();
        assert_eq!(capture.stop().unwrap().pcm().len(), 8);
        assert_eq!(mic.releases(), 1);
    }

    #[tokio::test]
    async fn test_start_async_reports_unavailable_device() {
        let mic = FakeMicrophone::unavailable();
        let mut capture = capture_with(&mic);
        assert!(matches!(
            capture.start_async().await,
            Err(VoiceError::DeviceUnavailable(_))
        ));
        assert_eq!(capture.state(), CaptureState::Idle);
    }
}
