//! Microphone capture: device access, session lifecycle, and clip encoding.

pub mod capture;
pub mod ring_buffer;
pub mod session;
pub mod state;
pub mod wav;

pub use capture::{list_input_devices, list_output_devices, CpalMicrophone};
pub use session::{AudioCapture, CaptureSession, Clip};
pub use state::CaptureState;

use crate::error::VoiceError;

/// Something that can hand out a live input stream.
pub trait Microphone: Send + Sync {
    /// Acquire the device. Fails with `PermissionDenied` or
    /// `DeviceUnavailable`.
    fn open(&self) -> Result<Box<dyn MicStream>, VoiceError>;
}

/// An open input stream, owned by exactly one [`AudioCapture`].
pub trait MicStream: Send {
    /// Rate of the samples returned by `read`.
    fn sample_rate(&self) -> u32;

    /// Mono f32 samples produced since the last call. Empty if none.
    fn read(&mut self) -> Vec<f32>;

    /// Stop the hardware stream. Must tolerate being called twice.
    fn release(&mut self);
}
