#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    frames_received: u64,
    frames_dropped: u64,
    reconnects: u64,
    sends_ok: u64,
    sends_failed: u64,
    audio_bytes_sent: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame(&mut self) {
        self.frames_received += 1;
    }

    pub(crate) fn record_dropped_frame(&mut self) {
        self.frames_dropped += 1;
    }

    pub(crate) fn record_reconnect(&mut self) {
        self.reconnects += 1;
    }

    pub(crate) fn record_send(&mut self, ok: bool, audio_bytes: usize) {
        if ok {
            self.sends_ok += 1;
            self.audio_bytes_sent += audio_bytes as u64;
        } else {
            self.sends_failed += 1;
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn sends_ok(&self) -> u64 {
        self.sends_ok
    }

    pub fn sends_failed(&self) -> u64 {
        self.sends_failed
    }

    pub fn audio_bytes_sent(&self) -> u64 {
        self.audio_bytes_sent
    }
}
