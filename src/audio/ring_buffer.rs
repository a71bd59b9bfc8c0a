//! Lock-free SPSC hand-off between the cpal callback thread and the capture.
//!
//! The producer lives inside the input stream callback; the consumer is
//! owned by the [`MicStream`](super::MicStream) that the turn driver polls.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ~10 seconds of 16 kHz mono audio.
pub const DEFAULT_CAPACITY: usize = 160_000;

/// Writing half, moved into the input callback.
pub struct SampleProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Reading half, drained on every poll.
pub struct SampleConsumer {
    inner: ringbuf::HeapCons<f32>,
}

/// Create a matched producer/consumer pair.
pub fn sample_ring(capacity: usize) -> (SampleProducer, SampleConsumer) {
    let rb = HeapRb::<f32>::new(capacity.max(1));
    let (prod, cons) = rb.split();
    (SampleProducer { inner: prod }, SampleConsumer { inner: cons })
}

impl SampleProducer {
    /// Push samples; returns how many fit. Excess is dropped when the
    /// consumer falls behind.
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

impl SampleConsumer {
    /// Number of samples waiting.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Take everything currently buffered, oldest first.
    pub fn drain_all(&mut self) -> Vec<f32> {
        let n = self.available();
        if n == 0 {
            return Vec::new();
        }
        let mut buf = vec![0.0f32; n];
        let read = self.inner.pop_slice(&mut buf);
        buf.truncate(read);
        buf
    }
}
