use std::time::Duration;

pub const BASE_URL_ENV: &str = "ADK_STREAM_BASE_URL";
pub const BASE_URL: &str = "http://localhost:8000";

pub const EVENTS_PATH: &str = "events";
pub const SEND_PATH: &str = "send";
pub const IS_AUDIO_PARAM: &str = "is_audio";

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const BATCH_PERIOD: Duration = Duration::from_millis(200);
pub const CHANNEL_CAPACITY: usize = 1024;

/// Seconds of agent audio the playback ring can hold.
pub const PLAYBACK_BUFFER_SECS: usize = 180;
/// Highest output device rate the playback ring is sized for.
pub const PLAYBACK_DEVICE_MAX_SAMPLE_RATE: u32 = 48000;
pub const RESAMPLER_CHUNK_SIZE: usize = 1024;
