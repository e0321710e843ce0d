use std::collections::VecDeque;

use adk_stream_utils::audio::StreamResampler;
use adk_stream_utils::{
    playback_ring, MediaBackend, MediaError, MediaStreams, PlaybackProducer, PlaybackSink,
};
use tokio::sync::mpsc;

use crate::batcher::OutboundBatcher;
use crate::client::consts::RESAMPLER_CHUNK_SIZE;
use crate::client::Config;

pub(crate) enum AudioWake {
    Frame(Vec<f32>),
    Tick,
    CaptureClosed,
}

/// Playback ring writer that converts agent audio to the device rate first.
pub(crate) struct ResamplingSink {
    producer: PlaybackProducer,
    resampler: Option<StreamResampler>,
}

impl ResamplingSink {
    pub fn new(producer: PlaybackProducer, resampler: Option<StreamResampler>) -> Self {
        Self {
            producer,
            resampler,
        }
    }
}

impl PlaybackSink for ResamplingSink {
    fn enqueue(&mut self, samples: &[f32]) {
        match self.resampler.as_mut() {
            Some(resampler) => {
                let resampled = resampler.process(samples);
                self.producer.push_slice(&resampled);
            }
            None => self.producer.push_slice(samples),
        }
    }

    fn flush(&mut self) {
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        self.producer.clear();
    }

    fn finish(&mut self) {
        if let Some(resampler) = self.resampler.as_mut() {
            let tail = resampler.finish();
            self.producer.push_slice(&tail);
        }
    }
}

/// Holds agent audio while no playback ring exists.
///
/// Same overflow policy as the ring: the oldest samples go first.
pub(crate) struct PendingPlayback {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl PendingPlayback {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Moves everything held into `sink`, oldest first.
    pub fn drain_into(&mut self, sink: &mut dyn PlaybackSink) {
        if self.samples.is_empty() {
            return;
        }
        tracing::debug!("moving {} buffered samples into playback", self.samples.len());
        let (front, back) = self.samples.as_slices();
        sink.enqueue(front);
        sink.enqueue(back);
        sink.finish();
        self.samples.clear();
    }
}

impl PlaybackSink for PendingPlayback {
    fn enqueue(&mut self, samples: &[f32]) {
        self.samples.extend(samples.iter().copied());
        let excess = self.samples.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.samples.drain(..excess);
        }
    }

    fn flush(&mut self) {
        self.samples.clear();
    }
}

/// Everything that exists only while audio mode is on.
pub(crate) struct AudioSession {
    playback: ResamplingSink,
    capture_rx: mpsc::Receiver<Vec<f32>>,
    capture_resampler: Option<StreamResampler>,
    batcher: OutboundBatcher,
    streams: Box<dyn MediaStreams>,
}

impl AudioSession {
    /// Opens the devices and builds the ring, resamplers and batcher around them.
    pub fn start<B>(backend: &mut B, config: &Config) -> Result<Self, MediaError>
    where
        B: MediaBackend + ?Sized,
    {
        let (producer, consumer) = playback_ring(config.playback_capacity());
        let (frames_tx, capture_rx) = mpsc::channel(config.channel_capacity());
        let mut streams = backend.open(consumer, frames_tx)?;

        let resamplers = StreamResampler::between(
            config.playback_sample_rate(),
            streams.playback_sample_rate(),
            RESAMPLER_CHUNK_SIZE,
        )
        .and_then(|playback| {
            StreamResampler::between(
                streams.capture_sample_rate(),
                config.capture_sample_rate(),
                RESAMPLER_CHUNK_SIZE,
            )
            .map(|capture| (playback, capture))
        });
        let (playback_resampler, capture_resampler) = match resamplers {
            Ok(resamplers) => resamplers,
            Err(e) => {
                streams.stop_capture();
                streams.stop_playback();
                return Err(MediaError::UnsupportedConfig(e.to_string()));
            }
        };

        tracing::info!(
            "audio devices ready, capture {} Hz, playback {} Hz",
            streams.capture_sample_rate(),
            streams.playback_sample_rate()
        );
        Ok(Self {
            playback: ResamplingSink::new(producer, playback_resampler),
            capture_rx,
            capture_resampler,
            batcher: OutboundBatcher::new(config.batch_period()),
            streams,
        })
    }

    pub fn playback(&mut self) -> &mut ResamplingSink {
        &mut self.playback
    }

    pub fn batcher(&mut self) -> &mut OutboundBatcher {
        &mut self.batcher
    }

    pub async fn next_wake(&mut self) -> AudioWake {
        tokio::select! {
            frame = self.capture_rx.recv() => match frame {
                Some(samples) => AudioWake::Frame(samples),
                None => AudioWake::CaptureClosed,
            },
            _ = self.batcher.tick() => AudioWake::Tick,
        }
    }

    pub fn on_capture_frame(&mut self, samples: &[f32]) {
        match self.capture_resampler.as_mut() {
            Some(resampler) => {
                let resampled = resampler.process(samples);
                self.batcher.on_capture_frame(&resampled);
            }
            None => self.batcher.on_capture_frame(samples),
        }
    }

    /// Batches frames the capture callback already delivered, down to the
    /// resampler's last samples. Leaves the batch timer as it was.
    pub fn drain_capture(&mut self) {
        let running = self.batcher.is_running();
        while let Ok(samples) = self.capture_rx.try_recv() {
            self.on_capture_frame(&samples);
        }
        if let Some(resampler) = self.capture_resampler.as_mut() {
            let tail = resampler.finish();
            self.batcher.on_capture_frame(&tail);
        }
        if !running {
            self.batcher.stop();
        }
    }

    pub fn stop_capture(&mut self) {
        self.streams.stop_capture();
        self.capture_rx.close();
    }

    pub fn stop_playback(mut self) {
        self.streams.stop_playback();
    }
}
