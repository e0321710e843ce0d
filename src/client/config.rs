use std::time::Duration;

use adk_stream_utils::audio::{CAPTURE_PCM16_SAMPLE_RATE, PLAYBACK_PCM16_SAMPLE_RATE};

use crate::client::consts;

#[derive(Debug, Clone)]
pub struct Config {
    base_url: String,
    reconnect_delay: Duration,
    batch_period: Duration,
    channel_capacity: usize,
    playback_sample_rate: u32,
    capture_sample_rate: u32,
    playback_buffer_secs: usize,
    input_device: Option<String>,
    output_device: Option<String>,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    pub fn with_batch_period(mut self, period: Duration) -> Self {
        self.config.batch_period = period;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_playback_sample_rate(mut self, rate: u32) -> Self {
        self.config.playback_sample_rate = rate;
        self
    }

    pub fn with_capture_sample_rate(mut self, rate: u32) -> Self {
        self.config.capture_sample_rate = rate;
        self
    }

    pub fn with_playback_buffer_secs(mut self, secs: usize) -> Self {
        self.config.playback_buffer_secs = secs.max(1);
        self
    }

    pub fn with_input_device(mut self, name: Option<String>) -> Self {
        self.config.input_device = name;
        self
    }

    pub fn with_output_device(mut self, name: Option<String>) -> Self {
        self.config.output_device = name;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    // Base URL comes from the environment so a same-origin proxy can be swapped in.
    pub fn new() -> Self {
        let base_url = std::env::var(consts::BASE_URL_ENV)
            .unwrap_or_else(|_| consts::BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            base_url,
            reconnect_delay: consts::RECONNECT_DELAY,
            batch_period: consts::BATCH_PERIOD,
            channel_capacity: consts::CHANNEL_CAPACITY,
            playback_sample_rate: PLAYBACK_PCM16_SAMPLE_RATE,
            capture_sample_rate: CAPTURE_PCM16_SAMPLE_RATE,
            playback_buffer_secs: consts::PLAYBACK_BUFFER_SECS,
            input_device: None,
            output_device: None,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    pub fn batch_period(&self) -> Duration {
        self.batch_period
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn playback_sample_rate(&self) -> u32 {
        self.playback_sample_rate
    }

    pub fn capture_sample_rate(&self) -> u32 {
        self.capture_sample_rate
    }

    /// Ring capacity in samples: enough for the longest expected utterance once
    /// it has been resampled to the output device rate.
    pub fn playback_capacity(&self) -> usize {
        let rate = self
            .playback_sample_rate
            .max(consts::PLAYBACK_DEVICE_MAX_SAMPLE_RATE);
        rate as usize * self.playback_buffer_secs
    }

    /// Capacity for agent audio held at its own rate before a ring exists.
    pub fn pending_playback_capacity(&self) -> usize {
        self.playback_sample_rate as usize * self.playback_buffer_secs
    }

    pub fn input_device(&self) -> Option<&str> {
        self.input_device.as_deref()
    }

    pub fn output_device(&self) -> Option<&str> {
        self.output_device.as_deref()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::builder().with_base_url("http://agent.local/").build();
        assert_eq!(config.base_url(), "http://agent.local");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.batch_period(), Duration::from_millis(200));
        assert_eq!(config.playback_sample_rate(), 24000);
        assert_eq!(config.capture_sample_rate(), 16000);
        assert_eq!(config.playback_capacity(), 48000 * 180);
        assert_eq!(config.pending_playback_capacity(), 24000 * 180);

        let config = Config::builder()
            .with_playback_sample_rate(96000)
            .with_playback_buffer_secs(2)
            .build();
        assert_eq!(config.playback_capacity(), 96000 * 2);
    }
}
