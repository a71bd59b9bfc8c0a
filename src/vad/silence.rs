//! Trailing-silence classifier.
//!
//! Watches a stream of [`EnergySample`]s and decides when a recording should
//! end. It never touches the capture itself; the caller acts on the
//! returned [`Decision`].

use std::time::Duration;

use super::energy::{EnergySample, DEFAULT_THRESHOLD};
use crate::audio::CaptureState;

/// Default trailing-silence window.
pub const DEFAULT_SILENCE_DURATION: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceConfig {
    /// Peak amplitude below which a window counts as silent.
    pub threshold: f32,
    /// How long silence must last before a stop is requested.
    pub silence_duration: Duration,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            silence_duration: DEFAULT_SILENCE_DURATION,
        }
    }
}

/// What the caller should do after a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    StopRequested,
    ResumeRequested,
}

/// Start of the current silent run, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SilenceWindow {
    silence_started_at: Option<Duration>,
}

impl SilenceWindow {
    pub fn silence_started_at(&self) -> Option<Duration> {
        self.silence_started_at
    }
}

#[derive(Debug, Clone)]
pub struct SilenceDetector {
    config: SilenceConfig,
    window: SilenceWindow,
    stop_emitted: bool,
}

impl SilenceDetector {
    pub fn new(config: SilenceConfig) -> Self {
        Self {
            config,
            window: SilenceWindow::default(),
            stop_emitted: false,
        }
    }

    pub fn window(&self) -> SilenceWindow {
        self.window
    }

    /// Classify one sample against the current capture state.
    pub fn observe(&mut self, sample: &EnergySample, capture: CaptureState) -> Decision {
        if !sample.is_silent(self.config.threshold) {
            self.window.silence_started_at = None;
            self.stop_emitted = false;
            return if capture == CaptureState::Paused {
                Decision::ResumeRequested
            } else {
                Decision::Continue
            };
        }

        let started = *self.window.silence_started_at.get_or_insert(sample.at);
        let elapsed = sample.at.saturating_sub(started);

        if elapsed >= self.config.silence_duration
            && capture == CaptureState::Recording
            && !self.stop_emitted
        {
            self.stop_emitted = true;
            return Decision::StopRequested;
        }
        Decision::Continue
    }

    /// Forget the current run, e.g. when a new capture starts.
    pub fn reset(&mut self) {
        self.window = SilenceWindow::default();
        self.stop_emitted = false;
    }
}

impl Default for SilenceDetector {
    fn default() -> Self {
        Self::new(SilenceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: f32 = 0.001;
    const LOUD: f32 = 0.4;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn feed(detector: &mut SilenceDetector, samples: &[(u64, f32)]) -> Vec<Decision> {
        samples
            .iter()
            .map(|&(t, peak)| {
                detector.observe(&EnergySample::new(ms(t), peak), CaptureState::Recording)
            })
            .collect()
    }

    #[test]
    fn test_stop_fires_at_first_sample_crossing_duration() {
        let mut detector = SilenceDetector::default();
        let samples: Vec<(u64, f32)> = (0..=5).map(|i| (i * 500, QUIET)).collect();
        let decisions = feed(&mut detector, &samples);
        assert_eq!(
            decisions,
            vec![
                Decision::Continue,
                Decision::Continue,
                Decision::Continue,
                Decision::Continue,
                Decision::StopRequested,
                Decision::Continue,
            ]
        );
    }

    #[test]
    fn test_never_stops_on_continuous_sound() {
        let mut detector = SilenceDetector::default();
        let samples: Vec<(u64, f32)> = (0..200).map(|i| (i * 100, LOUD)).collect();
        assert!(feed(&mut detector, &samples)
            .iter()
            .all(|d| *d == Decision::Continue));
    }

    #[test]
    fn test_first_silent_sample_opens_window() {
        let mut detector = SilenceDetector::default();
        let d = detector.observe(&EnergySample::new(ms(5000), QUIET), CaptureState::Recording);
        assert_eq!(d, Decision::Continue);
        assert_eq!(detector.window().silence_started_at(), Some(ms(5000)));
    }

    #[test]
    fn test_sound_resets_the_window() {
        let mut detector = SilenceDetector::default();
        let decisions = feed(
            &mut detector,
            &[(0, QUIET), (1500, QUIET), (1900, LOUD), (2000, QUIET), (3900, QUIET)],
        );
        assert!(decisions.iter().all(|d| *d == Decision::Continue));
        assert_eq!(detector.window().silence_started_at(), Some(ms(2000)));
        let d = detector.observe(&EnergySample::new(ms(4000), QUIET), CaptureState::Recording);
        assert_eq!(d, Decision::StopRequested);
    }

    #[test]
    fn test_exactly_one_stop_per_silent_run() {
        let mut detector = SilenceDetector::new(SilenceConfig {
            threshold: 0.02,
            silence_duration: ms(1000),
        });
        let samples: Vec<(u64, f32)> = (0..40).map(|i| (i * 100, QUIET)).collect();
        let stops = feed(&mut detector, &samples)
            .into_iter()
            .filter(|d| *d == Decision::StopRequested)
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_paused_capture_resumes_on_sound_and_never_stops() {
        let mut detector = SilenceDetector::default();
        for t in [0, 1000, 2000, 3000] {
            let d = detector.observe(&EnergySample::new(ms(t), QUIET), CaptureState::Paused);
            assert_eq!(d, Decision::Continue);
        }
        let d = detector.observe(&EnergySample::new(ms(3100), LOUD), CaptureState::Paused);
        assert_eq!(d, Decision::ResumeRequested);
        assert_eq!(detector.window().silence_started_at(), None);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut detector = SilenceDetector::default();
        detector.observe(&EnergySample::new(ms(0), 0.02), CaptureState::Recording);
        assert_eq!(detector.window().silence_started_at(), None);
    }
}
