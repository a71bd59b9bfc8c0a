//! In-process fakes for the collaborator traits, shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::audio::{Clip, MicStream, Microphone};
use crate::chat::ChatRuntime;
use crate::error::VoiceError;
use crate::stt::Transcriber;
use crate::tts::{AudioSink, SynthesizedAudio, Synthesizer};

#[derive(Default)]
struct MicInner {
    frames: Mutex<VecDeque<Vec<f32>>>,
    tail: Vec<f32>,
    opens: AtomicUsize,
    releases: AtomicUsize,
    deny: bool,
    missing: bool,
}

/// Microphone that replays a fixed script of frames, then repeats `tail`.
pub struct FakeMicrophone {
    inner: Arc<MicInner>,
}

impl FakeMicrophone {
    pub fn scripted(frames: Vec<Vec<f32>>) -> Arc<Self> {
        Self::with_tail(frames, Vec::new())
    }

    pub fn with_tail(frames: Vec<Vec<f32>>, tail: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MicInner {
                frames: Mutex::new(frames.into()),
                tail,
                ..Default::default()
            }),
        })
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MicInner {
                deny: true,
                ..Default::default()
            }),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MicInner {
                missing: true,
                ..Default::default()
            }),
        })
    }

    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }
}

impl Microphone for FakeMicrophone {
    fn open(&self) -> Result<Box<dyn MicStream>, VoiceError> {
        if self.inner.deny {
            return Err(VoiceError::PermissionDenied("denied by test".into()));
        }
        if self.inner.missing {
            return Err(VoiceError::DeviceUnavailable("no input device".into()));
        }
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            inner: Arc::clone(&self.inner),
            released: false,
        }))
    }
}

struct FakeStream {
    inner: Arc<MicInner>,
    released: bool,
}

impl MicStream for FakeStream {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn read(&mut self) -> Vec<f32> {
        let next = self.inner.frames.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.inner.tail.clone())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Backend that records every call and answers from canned values.
pub struct FakeBackend {
    pub calls: Mutex<Vec<String>>,
    pub transcript: String,
    pub fail_transcribe: bool,
    pub fail_synthesize: bool,
}

impl FakeBackend {
    pub fn new(transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            transcript: transcript.to_string(),
            fail_transcribe: false,
            fail_synthesize: false,
        })
    }

    pub fn failing_transcribe() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            transcript: String::new(),
            fail_transcribe: true,
            fail_synthesize: false,
        })
    }

    pub fn failing_synthesize(transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            transcript: transcript.to_string(),
            fail_transcribe: false,
            fail_synthesize: true,
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for FakeBackend {
    async fn transcribe(&self, clip: &Clip) -> Result<String, VoiceError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("upload:{}", clip.pcm().len()));
        if self.fail_transcribe {
            self.calls.lock().unwrap().push("transcribe:err".into());
            return Err(VoiceError::NetworkFailure("transcribe returned 500".into()));
        }
        self.calls.lock().unwrap().push("transcribe:ok".into());
        Ok(self.transcript.clone())
    }
}

#[async_trait]
impl Synthesizer for FakeBackend {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, VoiceError> {
        self.calls.lock().unwrap().push(format!("synthesize:{text}"));
        if self.fail_synthesize {
            return Err(VoiceError::NetworkFailure("synthesis unavailable".into()));
        }
        Ok(SynthesizedAudio::new(vec![0xFF, 0xFB, 0x90, 0x00]))
    }
}

/// Chat runtime that echoes a fixed reply and records what it was sent.
pub struct FakeChat {
    pub replies: Mutex<Vec<String>>,
    pub answer: String,
    pub stall: bool,
}

impl FakeChat {
    pub fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(Vec::new()),
            answer: answer.to_string(),
            stall: false,
        })
    }

    /// Records the request but never answers.
    pub fn stalled() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(Vec::new()),
            answer: String::new(),
            stall: true,
        })
    }

    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatRuntime for FakeChat {
    async fn reply(&self, text: &str) -> Result<String, VoiceError> {
        self.replies.lock().unwrap().push(text.to_string());
        if self.stall {
            std::future::pending::<()>().await;
        }
        Ok(self.answer.clone())
    }
}

/// Sink that finishes playback immediately, never when `hang` is set, or
/// with a decode error when `fail` is set.
#[derive(Default)]
pub struct FakeSink {
    pub played: AtomicUsize,
    pub stopped: AtomicBool,
    pub hang: bool,
    pub fail: bool,
}

impl FakeSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            hang: true,
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn played(&self) -> usize {
        self.played.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, _audio: &SynthesizedAudio) -> Result<(), VoiceError> {
        self.played.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(VoiceError::PlaybackFailure("undecodable audio".into()));
        }
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
