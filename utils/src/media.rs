use tokio::sync::mpsc;

use crate::playback::PlaybackConsumer;

/// Raised when the microphone or speaker cannot be brought up.
///
/// Fatal to audio mode only; text mode keeps working.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("audio device permission denied: {0}")]
    PermissionDenied(String),
    #[error("unsupported audio device configuration: {0}")]
    UnsupportedConfig(String),
    #[error("audio stream error: {0}")]
    Stream(String),
}

/// Live capture and playback streams started by a [`MediaBackend`].
///
/// Capture and playback are released separately so callers can stop the
/// microphone before the speaker finishes draining queued audio.
pub trait MediaStreams: Send {
    /// Rate of the mono frames delivered to the frame sender.
    fn capture_sample_rate(&self) -> u32;

    /// Rate at which the output callback pulls from the playback ring.
    fn playback_sample_rate(&self) -> u32;

    /// Stops the input callback. Idempotent.
    fn stop_capture(&mut self);

    /// Stops the output callback and drops the ring consumer. Idempotent.
    fn stop_playback(&mut self);
}

/// Opens the audio devices used by audio mode.
pub trait MediaBackend: Send {
    /// Starts an input callback that pushes mono frames into `frames` without
    /// blocking, and an output callback that drains `playback`.
    fn open(
        &mut self,
        playback: PlaybackConsumer,
        frames: mpsc::Sender<Vec<f32>>,
    ) -> Result<Box<dyn MediaStreams>, MediaError>;
}

/// Backend for text-only sessions: audio mode is always unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMedia;

impl MediaBackend for NoMedia {
    fn open(
        &mut self,
        _playback: PlaybackConsumer,
        _frames: mpsc::Sender<Vec<f32>>,
    ) -> Result<Box<dyn MediaStreams>, MediaError> {
        Err(MediaError::DeviceUnavailable(
            "no audio backend configured".to_string(),
        ))
    }
}
