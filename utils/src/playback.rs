//! Fixed-capacity playback ring shared between the event loop and the output callback.
//!
//! One producer enqueues decoded audio and may flush; one consumer pulls samples
//! from the real-time callback. Neither side locks or allocates. When the ring is
//! full the oldest unplayed sample is overwritten, so playback favors fresh audio.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Destination for decoded playback audio.
pub trait PlaybackSink {
    /// Appends samples behind everything already queued.
    fn enqueue(&mut self, samples: &[f32]);

    /// Discards every queued sample that has not been played yet.
    fn flush(&mut self);

    /// Marks the end of an utterance so nothing is held back from playback.
    fn finish(&mut self) {}
}

struct Ring {
    slots: Box<[AtomicU32]>,
    // Both positions only ever grow; a slot is addressed by `position % capacity`.
    read: AtomicUsize,
    write: AtomicUsize,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, position: usize) -> &AtomicU32 {
        &self.slots[position % self.slots.len()]
    }

    fn pending(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }
}

/// Creates a ring holding up to `capacity` pending samples, split into its two ends.
pub fn playback_ring(capacity: usize) -> (PlaybackProducer, PlaybackConsumer) {
    let capacity = capacity.max(1);
    let slots = (0..capacity)
        .map(|_| AtomicU32::new(0.0f32.to_bits()))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let ring = Arc::new(Ring {
        slots,
        read: AtomicUsize::new(0),
        write: AtomicUsize::new(0),
    });
    (
        PlaybackProducer { ring: ring.clone() },
        PlaybackConsumer { ring },
    )
}

/// Writing end of the ring, owned by the event loop.
pub struct PlaybackProducer {
    ring: Arc<Ring>,
}

impl PlaybackProducer {
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Samples queued and not yet pulled.
    pub fn pending(&self) -> usize {
        self.ring.pending()
    }

    /// Writes samples one at a time; never blocks and never fails.
    pub fn push_slice(&self, samples: &[f32]) {
        let ring = &*self.ring;
        let capacity = ring.capacity();
        let mut write = ring.write.load(Ordering::Relaxed);
        for &sample in samples {
            // full: the slot about to be written still holds the oldest pending
            // sample, so step the reader past it before overwriting
            let mut read = ring.read.load(Ordering::Acquire);
            while write.wrapping_sub(read) >= capacity {
                match ring.read.compare_exchange_weak(
                    read,
                    read.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(current) => read = current,
                }
            }
            ring.slot(write).store(sample.to_bits(), Ordering::Relaxed);
            write = write.wrapping_add(1);
            ring.write.store(write, Ordering::Release);
        }
    }

    /// Moves the read position onto the write position in one store.
    pub fn clear(&self) {
        let write = self.ring.write.load(Ordering::Relaxed);
        self.ring.read.store(write, Ordering::Release);
    }
}

impl PlaybackSink for PlaybackProducer {
    fn enqueue(&mut self, samples: &[f32]) {
        self.push_slice(samples);
    }

    fn flush(&mut self) {
        self.clear();
    }
}

/// Reading end of the ring, owned by the output callback.
pub struct PlaybackConsumer {
    ring: Arc<Ring>,
}

impl PlaybackConsumer {
    /// Returns the next pending sample, or silence when nothing is queued.
    pub fn pull_sample(&mut self) -> f32 {
        let ring = &*self.ring;
        loop {
            let read = ring.read.load(Ordering::Acquire);
            let write = ring.write.load(Ordering::Acquire);
            if read == write {
                return 0.0;
            }
            let sample = ring.slot(read).load(Ordering::Relaxed);
            // the producer may have moved `read` on overflow or flush
            if ring
                .read
                .compare_exchange(
                    read,
                    read.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return f32::from_bits(sample);
            }
        }
    }

    /// Fills `out` from the ring, padding with silence.
    pub fn pull_into(&mut self, out: &mut [f32]) {
        for frame in out.iter_mut() {
            *frame = self.pull_sample();
        }
    }

    /// Allocating variant of [`pull_into`](Self::pull_into), for callers off the audio thread.
    pub fn pull(&mut self, n: usize) -> Vec<f32> {
        let mut out = vec![0.0; n];
        self.pull_into(&mut out);
        out
    }

    pub fn pending(&self) -> usize {
        self.ring.pending()
    }
}
