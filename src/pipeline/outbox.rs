use adk_stream_types::{MimeType, OutboundEnvelope};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::EnvelopeSink;
use crate::error::SendError;
use crate::pipeline::PipelineEvent;

/// Single sender task: envelopes leave strictly in submission order.
///
/// Accepting an envelope only means it was queued; delivery failures are
/// reported as [`PipelineEvent::SendFailed`].
pub(crate) struct Outbox {
    tx: mpsc::Sender<OutboundEnvelope>,
    handle: JoinHandle<()>,
}

impl Outbox {
    pub fn spawn<S>(
        sink: S,
        capacity: usize,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Self
    where
        S: EnvelopeSink + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<OutboundEnvelope>(capacity);
        let handle = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let mime_type = match envelope {
                    OutboundEnvelope::Text(_) => MimeType::TextPlain,
                    OutboundEnvelope::Audio(_) => MimeType::AudioPcm,
                };
                if let Err(e) = sink.send(envelope).await {
                    let _ = events.send(PipelineEvent::SendFailed {
                        mime_type,
                        reason: e.to_string(),
                    });
                }
            }
        });
        Self { tx, handle }
    }

    /// Drops queued envelopes and stops the sender.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[async_trait]
impl EnvelopeSink for Outbox {
    async fn send(&self, envelope: OutboundEnvelope) -> Result<(), SendError> {
        self.tx.send(envelope).await.map_err(|_| SendError::Closed)
    }
}
