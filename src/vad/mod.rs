//! Energy-based voice activity gating.

pub mod energy;
pub mod silence;

pub use energy::EnergySample;
pub use silence::{Decision, SilenceConfig, SilenceDetector, SilenceWindow};
