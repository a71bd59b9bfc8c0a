//! Turn-taking controller.
//!
//! Runs one voice turn at a time on a spawned task:
//!
//! ```text
//! Idle -> Arming -> Recording -> Finalizing -> Transcribing -> Replying
//!      -> Synthesizing -> Playing -> Idle (or Arming in continuous mode)
//! ```
//!
//! Any error moves through `Failed` back to `Idle`. `cancel_turn()` drops the
//! running turn, which releases the microphone and aborts in-flight requests.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::TurnEvent;
use super::state::{TurnState, VoiceTurn};
use crate::audio::{AudioCapture, CaptureState, Clip, Microphone};
use crate::chat::ChatRuntime;
use crate::config::VoiceTurnConfig;
use crate::error::VoiceError;
use crate::stt::Transcriber;
use crate::tts::{AudioSink, Synthesizer};
use crate::vad::energy::mean_amplitude;
use crate::vad::{Decision, EnergySample, SilenceDetector};

const EVENT_CAPACITY: usize = 256;

/// The external pieces a turn talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub microphone: Arc<dyn Microphone>,
    pub transcriber: Arc<dyn Transcriber>,
    pub chat: Arc<dyn ChatRuntime>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub sink: Arc<dyn AudioSink>,
}

struct Slot {
    state: TurnState,
    /// Bumped by every `begin_turn`. State writes from an older turn are
    /// dropped.
    generation: u64,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    config: VoiceTurnConfig,
    parts: Collaborators,
    slot: Mutex<Slot>,
    /// Finish the recording now (user stop).
    force_stop: AtomicBool,
    /// Keep the capture paused until cleared.
    hold: AtomicBool,
    /// End in Idle after the current turn even in continuous mode.
    no_rearm: AtomicBool,
    last_turn: Mutex<Option<VoiceTurn>>,
    events: broadcast::Sender<TurnEvent>,
}

/// Cheap-to-clone handle; all clones drive the same state machine.
#[derive(Clone)]
pub struct TurnController {
    shared: Arc<Shared>,
}

impl TurnController {
    pub fn new(config: VoiceTurnConfig, parts: Collaborators) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                parts,
                slot: Mutex::new(Slot {
                    state: TurnState::Idle,
                    generation: 0,
                    cancel: None,
                    task: None,
                }),
                force_stop: AtomicBool::new(false),
                hold: AtomicBool::new(false),
                no_rearm: AtomicBool::new(false),
                last_turn: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn config(&self) -> &VoiceTurnConfig {
        &self.shared.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> TurnState {
        self.slot().state
    }

    /// The most recent turn that ran to completion.
    pub fn last_turn(&self) -> Option<VoiceTurn> {
        self.shared
            .last_turn
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Start a voice turn. Only legal from Idle.
    ///
    /// Must be called from within a tokio runtime; the turn runs on its own
    /// task and reports progress through [`subscribe`](Self::subscribe).
    pub fn begin_turn(&self) -> Result<(), VoiceError> {
        let mut slot = self.slot();
        if !slot.state.is_idle() {
            debug!(state = %slot.state, "begin_turn rejected");
            return Err(VoiceError::TurnInProgress);
        }

        let token = CancellationToken::new();
        slot.generation += 1;
        let generation = slot.generation;
        slot.state = TurnState::Arming;
        slot.cancel = Some(token.clone());
        self.shared.no_rearm.store(false, Ordering::SeqCst);
        let this = self.clone();
        slot.task = Some(tokio::spawn(async move {
            this.drive(token, generation).await
        }));
        // Published under the lock so it precedes anything the task emits.
        self.emit(TurnEvent::StateChanged {
            state: TurnState::Arming,
        });
        drop(slot);

        info!(generation, "Voice turn started");
        Ok(())
    }

    /// Let the running turn finish but do not re-arm afterwards, even in
    /// continuous mode. The controller ends in Idle.
    pub fn stop_rearming(&self) {
        self.shared.no_rearm.store(true, Ordering::SeqCst);
    }

    /// Finish the current recording without waiting for silence.
    pub fn stop_recording(&self) -> bool {
        let state = self.state();
        if state != TurnState::Recording {
            debug!(state = %state, "Ignoring stop_recording");
            return false;
        }
        self.shared.force_stop.store(true, Ordering::SeqCst);
        true
    }

    /// Put the live capture on hold. Sound returning resumes it.
    pub fn pause_recording(&self) -> bool {
        if self.state() != TurnState::Recording {
            return false;
        }
        self.shared.hold.store(true, Ordering::SeqCst);
        true
    }

    pub fn resume_recording(&self) -> bool {
        if self.state() != TurnState::Recording {
            return false;
        }
        self.shared.hold.store(false, Ordering::SeqCst);
        true
    }

    /// Abort whatever the current turn is doing and return to Idle.
    ///
    /// Returns `false` if there was nothing to cancel.
    /// Returns `false` if there was nothing to cancel, another cancel is
    /// already in flight, or the turn ended on its own first.
    pub async fn cancel_turn(&self) -> bool {
        let Some((generation, token, task)) = self.take_for_cancel() else {
            return false;
        };

        info!(generation, "Cancelling voice turn");
        token.cancel();
        self.shared.parts.sink.stop();
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                warn!("Turn task ended abnormally: {}", e);
            }
        }

        self.finish_cancel(generation)
    }

    fn take_for_cancel(&self) -> Option<(u64, CancellationToken, JoinHandle<()>)> {
        let mut slot = self.slot();
        if slot.state.is_idle() {
            return None;
        }
        let token = slot.cancel.take()?;
        let task = slot.task.take()?;
        Some((slot.generation, token, task))
    }

    /// Publish Idle + Cancelled for `generation`, unless that turn already
    /// reached Idle by itself or a newer turn owns the slot.
    fn finish_cancel(&self, generation: u64) -> bool {
        let mut slot = self.slot();
        if slot.generation != generation || slot.state.is_idle() {
            debug!(generation, "Turn ended before the cancel took effect");
            return false;
        }
        slot.state = TurnState::Idle;
        self.emit(TurnEvent::StateChanged {
            state: TurnState::Idle,
        });
        self.emit(TurnEvent::Cancelled);
        true
    }

    async fn drive(self, token: CancellationToken, generation: u64) {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                outcome = self.run_turn(generation) => outcome,
            };

            match outcome {
                Ok(turn) => {
                    let turn_id = turn.id.clone();
                    *self
                        .shared
                        .last_turn
                        .lock()
                        .unwrap_or_else(|e| e.into_inner()) = Some(turn);
                    self.emit(TurnEvent::Completed { turn_id });

                    let rearm = self.shared.config.continuous_mode
                        && !token.is_cancelled()
                        && !self.shared.no_rearm.load(Ordering::SeqCst);
                    if rearm {
                        info!("Continuous mode, re-arming capture");
                        self.set_state(generation, TurnState::Arming);
                        continue;
                    }
                    self.set_state(generation, TurnState::Idle);
                }
                Err(e) => {
                    error!(kind = %e.kind(), "Voice turn failed: {}", e);
                    self.set_state(generation, TurnState::Failed);
                    self.emit(TurnEvent::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                    self.set_state(generation, TurnState::Idle);
                }
            }
            return;
        }
    }

    async fn run_turn(&self, generation: u64) -> Result<VoiceTurn, VoiceError> {
        let parts = &self.shared.parts;
        self.shared.force_stop.store(false, Ordering::SeqCst);
        self.shared.hold.store(false, Ordering::SeqCst);

        let mut capture = AudioCapture::new(Arc::clone(&parts.microphone));
        capture.start_async().await?;
        self.set_state(generation, TurnState::Recording);

        let clip = self.record(generation, &mut capture).await?;
        drop(capture);

        let mut turn = VoiceTurn::new(clip);
        if turn.clip.is_empty() {
            info!(turn_id = %turn.id, "No audio captured, nothing to transcribe");
            return Ok(turn);
        }

        self.set_state(generation, TurnState::Transcribing);
        let transcript = self
            .network_step("transcribe", parts.transcriber.transcribe(&turn.clip))
            .await?;
        turn.transcript = Some(transcript.clone());
        self.emit(TurnEvent::Transcript {
            turn_id: turn.id.clone(),
            text: transcript.clone(),
        });
        if transcript.trim().is_empty() {
            info!(turn_id = %turn.id, "Empty transcript, skipping reply");
            return Ok(turn);
        }

        self.set_state(generation, TurnState::Replying);
        let reply = self
            .network_step("reply", parts.chat.reply(&transcript))
            .await?;
        turn.reply_text = Some(reply.clone());
        self.emit(TurnEvent::Reply {
            turn_id: turn.id.clone(),
            text: reply.clone(),
        });
        if reply.trim().is_empty() {
            info!(turn_id = %turn.id, "Empty reply, nothing to speak");
            return Ok(turn);
        }

        self.set_state(generation, TurnState::Synthesizing);
        let audio = self
            .network_step("synthesize", parts.synthesizer.synthesize(&reply))
            .await?;
        let audio_url = audio.data_url();
        turn.synthesized_audio_url = Some(audio_url.clone());

        self.set_state(generation, TurnState::Playing);
        self.emit(TurnEvent::SpeakingStarted {
            turn_id: turn.id.clone(),
            audio_url,
        });
        parts.sink.play(&audio).await?;
        self.emit(TurnEvent::SpeakingEnded {
            turn_id: turn.id.clone(),
        });

        Ok(turn)
    }

    /// Feed the detector until it, the user, or the length cap ends the
    /// recording, then finalize the clip.
    async fn record(
        &self,
        generation: u64,
        capture: &mut AudioCapture,
    ) -> Result<Clip, VoiceError> {
        let config = &self.shared.config;
        let mut detector = SilenceDetector::new(config.silence());
        let mut ticker = tokio::time::interval(config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let started = Instant::now();

        loop {
            ticker.tick().await;
            let at = started.elapsed();

            if self.shared.force_stop.swap(false, Ordering::SeqCst) {
                info!(elapsed_ms = at.as_millis() as u64, "Recording stopped by request");
                break;
            }
            self.apply_hold(capture)?;

            if let Some(frame) = capture.poll() {
                let sample = EnergySample::from_window(at, &frame, config.energy_window);
                debug!(
                    peak = sample.peak,
                    mean = mean_amplitude(&frame),
                    state = %capture.state(),
                    "Energy sample"
                );
                match detector.observe(&sample, capture.state()) {
                    Decision::StopRequested => {
                        info!(elapsed_ms = at.as_millis() as u64, "Trailing silence, stopping capture");
                        break;
                    }
                    Decision::ResumeRequested => {
                        self.shared.hold.store(false, Ordering::SeqCst);
                        capture.resume()?;
                        // The frame that ended the hold is speech; keep it.
                        capture.push_frame(&frame);
                        info!("Sound returned, capture resumed");
                    }
                    Decision::Continue => {}
                }
            }

            if at >= config.max_recording() {
                warn!(
                    max_ms = config.max_recording_ms,
                    "Recording hit its length cap, stopping capture"
                );
                break;
            }
        }

        self.set_state(generation, TurnState::Finalizing);
        capture.stop()
    }

    fn apply_hold(&self, capture: &mut AudioCapture) -> Result<(), VoiceError> {
        let hold = self.shared.hold.load(Ordering::SeqCst);
        match (hold, capture.state()) {
            (true, CaptureState::Recording) => {
                capture.pause()?;
                info!("Capture paused");
            }
            (false, CaptureState::Paused) => {
                capture.resume()?;
                info!("Capture resumed");
            }
            _ => {}
        }
        Ok(())
    }

    /// Bound a network step by the configured timeout. Expiry is a
    /// `NetworkFailure` like any other.
    async fn network_step<T>(
        &self,
        step: &'static str,
        fut: impl Future<Output = Result<T, VoiceError>>,
    ) -> Result<T, VoiceError> {
        match self.shared.config.request_timeout() {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                VoiceError::NetworkFailure(format!(
                    "{step} timed out after {}ms",
                    limit.as_millis()
                ))
            })?,
            None => fut.await,
        }
    }

    fn set_state(&self, generation: u64, state: TurnState) {
        let mut slot = self.slot();
        if slot.generation != generation {
            debug!(generation, current = slot.generation, "Dropping stale state change");
            return;
        }
        let previous = std::mem::replace(&mut slot.state, state);
        if previous != state {
            debug!(from = %previous, to = %state, "Turn state change");
            self.emit(TurnEvent::StateChanged { state });
        }
    }

    fn emit(&self, event: TurnEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.shared.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}
