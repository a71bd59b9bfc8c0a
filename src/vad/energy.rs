//! Amplitude readings over a window of captured audio.

use std::time::Duration;

/// Default silence threshold on a [-1, 1] scale.
pub const DEFAULT_THRESHOLD: f32 = 0.02;

/// Largest absolute sample value in the window. Zero for an empty window.
pub fn peak_amplitude(window: &[f32]) -> f32 {
    window.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
}

/// Mean absolute amplitude, used for level logging.
pub fn mean_amplitude(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f32 = window.iter().map(|s| s.abs()).sum();
    sum / window.len() as f32
}

/// A single reading taken `at` since capture started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergySample {
    pub at: Duration,
    pub peak: f32,
}

impl EnergySample {
    pub fn new(at: Duration, peak: f32) -> Self {
        Self { at, peak }
    }

    /// Measure the trailing `max_len` samples of `window`.
    pub fn from_window(at: Duration, window: &[f32], max_len: usize) -> Self {
        let start = window.len().saturating_sub(max_len.max(1));
        Self::new(at, peak_amplitude(&window[start..]))
    }

    /// True iff every sample in the window was below `threshold`.
    pub fn is_silent(&self, threshold: f32) -> bool {
        self.peak < threshold
    }
}
