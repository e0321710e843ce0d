pub mod audio;
pub mod media;
pub mod playback;

#[cfg(feature = "device")]
pub mod device;

pub use media::{MediaBackend, MediaError, MediaStreams, NoMedia};
pub use playback::{playback_ring, PlaybackConsumer, PlaybackProducer, PlaybackSink};
