//! Collects captured audio and releases it as one send per period.

use std::time::Duration;

use adk_stream_types::OutboundEnvelope;
use adk_stream_utils::audio::f32_to_pcm16_bytes;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::client::EnvelopeSink;
use crate::error::SendError;

/// Capture accumulator plus its flush timer.
///
/// The timer starts on the first captured frame and runs until [`stop`](Self::stop).
#[derive(Debug)]
pub struct OutboundBatcher {
    chunks: Vec<Vec<u8>>,
    period: Duration,
    timer: Option<Interval>,
}

impl OutboundBatcher {
    pub fn new(period: Duration) -> Self {
        Self {
            chunks: Vec::new(),
            period,
            timer: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Bytes accumulated since the last flush.
    pub fn pending_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn on_capture_frame(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        self.chunks.push(f32_to_pcm16_bytes(samples));
        if self.timer.is_none() {
            let mut timer = time::interval_at(Instant::now() + self.period, self.period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.timer = Some(timer);
            tracing::debug!("batch timer started, period {:?}", self.period);
        }
    }

    /// Completes on the next timer tick; never completes while the timer is stopped.
    pub async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Concatenates and clears the accumulator. `None` when there is nothing to send.
    pub fn take_batch(&mut self) -> Option<OutboundEnvelope> {
        if self.chunks.is_empty() {
            return None;
        }
        let bytes = self.chunks.concat();
        self.chunks.clear();
        Some(OutboundEnvelope::Audio(bytes))
    }

    /// Sends the accumulated audio as one envelope. Returns whether anything was sent.
    pub async fn flush<S>(&mut self, sink: &S) -> Result<bool, SendError>
    where
        S: EnvelopeSink + ?Sized,
    {
        match self.take_batch() {
            Some(envelope) => {
                tracing::debug!("flushing {} bytes of captured audio", envelope.len());
                sink.send(envelope).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn stop(&mut self) {
        if self.timer.take().is_some() {
            tracing::debug!("batch timer stopped");
        }
    }

    /// Drops captured audio without sending it.
    pub fn discard(&mut self) {
        let dropped = self.pending_bytes();
        self.chunks.clear();
        if dropped > 0 {
            tracing::debug!("discarded {} bytes of captured audio", dropped);
        }
    }
}
