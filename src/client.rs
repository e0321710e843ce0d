use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use adk_stream_types::{ClientMessage, InboundEvent, OutboundEnvelope, SessionId};
use async_trait::async_trait;
use futures_util::StreamExt;
#[cfg(test)]
use mockall::automock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::client::sse::SseDecoder;
use crate::error::{SendError, TransportError};

pub mod config;
pub mod consts;
mod sse;
mod stats;
pub(crate) mod utils;

pub use config::{Config, ConfigBuilder};
pub use stats::Stats;

/// Health of the inbound push stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Item yielded by an [`InboundStream`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Status(ConnectionStatus),
    Inbound(InboundEvent),
}

/// Receiving end of one push-stream subscription.
///
/// The stream reconnects on its own until it is closed or dropped.
pub struct InboundStream {
    audio_mode: bool,
    rx: mpsc::Receiver<SessionEvent>,
    handle: JoinHandle<()>,
}

impl InboundStream {
    pub fn audio_mode(&self) -> bool {
        self.audio_mode
    }

    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Stops the connection and any pending reconnect.
    pub fn close(self) {
        self.handle.abort();
    }
}

impl Drop for InboundStream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl futures::Stream for InboundStream {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Anything that can deliver one outbound envelope to the agent.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EnvelopeSink: Send + Sync {
    async fn send(&self, envelope: OutboundEnvelope) -> Result<(), SendError>;
}

/// Transport session: one push stream at a time plus a one-shot send channel,
/// both addressed by the same session id.
#[derive(Clone)]
pub struct Client {
    config: Arc<Config>,
    http: reqwest::Client,
    session_id: SessionId,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    /// Creates a client with a freshly generated session id.
    pub fn new(config: Config) -> Self {
        let session_id = SessionId::new(uuid::Uuid::new_v4().simple().to_string());
        Self::with_session(config, session_id)
    }

    pub fn with_session(config: Config, session_id: SessionId) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
            session_id,
            status_tx: Arc::new(status_tx),
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Watches the latest connection status.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn stats(&self) -> Stats {
        match self.stats.lock() {
            Ok(stats_guard) => stats_guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update_stats(&self, f: impl FnOnce(&mut Stats)) {
        if let Ok(mut stats_guard) = self.stats.lock() {
            f(&mut stats_guard);
        } else {
            tracing::error!("failed to update stats");
        }
    }

    /// Opens the push stream for `audio_mode`.
    ///
    /// Switching modes means closing the returned stream and opening a new one.
    pub fn open(&self, audio_mode: bool) -> InboundStream {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity());
        let url = utils::events_url(&self.config, &self.session_id, audio_mode);
        let client = self.clone();
        let handle = tokio::spawn(async move {
            client.run_push_stream(url, tx).await;
        });
        InboundStream {
            audio_mode,
            rx,
            handle,
        }
    }

    /// Sends one envelope. Failures are logged and returned, never retried.
    pub async fn send(&self, envelope: OutboundEnvelope) -> Result<(), SendError> {
        let url = utils::send_url(&self.config, &self.session_id);
        let body = utils::encode_envelope(&envelope);
        let audio_bytes = match &envelope {
            OutboundEnvelope::Audio(bytes) => bytes.len(),
            OutboundEnvelope::Text(_) => 0,
        };

        let result = self.post(&url, &body).await;
        match &result {
            Ok(()) => tracing::debug!(
                "sent {} message, {} bytes",
                body.mime_type().as_str(),
                envelope.len()
            ),
            Err(e) => tracing::error!(
                "failed to send {} message: {}",
                body.mime_type().as_str(),
                e
            ),
        }
        self.update_stats(|stats| stats.record_send(result.is_ok(), audio_bytes));
        result
    }

    async fn post(&self, url: &str, body: &ClientMessage) -> Result<(), SendError> {
        let response = self.http.post(url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(SendError::Status(response.status()));
        }
        Ok(())
    }

    async fn set_status(
        &self,
        status: ConnectionStatus,
        tx: &mpsc::Sender<SessionEvent>,
    ) -> bool {
        self.status_tx.send_replace(status);
        tx.send(SessionEvent::Status(status)).await.is_ok()
    }

    // Reconnects forever after a fixed delay; only the consumer going away stops it.
    async fn run_push_stream(&self, url: String, tx: mpsc::Sender<SessionEvent>) {
        let mut first = true;
        loop {
            if !first {
                self.update_stats(|stats| stats.record_reconnect());
                tracing::info!("reconnecting push stream for session {}", self.session_id);
            }
            first = false;

            if !self.set_status(ConnectionStatus::Connecting, &tx).await {
                return;
            }
            let result = self.pump(&url, &tx).await;
            if tx.is_closed() {
                return;
            }
            if let Err(e) = result {
                tracing::warn!("push stream for session {} ended: {}", self.session_id, e);
            }
            if !self.set_status(ConnectionStatus::Disconnected, &tx).await {
                return;
            }
            tokio::time::sleep(self.config.reconnect_delay()).await;
        }
    }

    // Ok means the consumer went away; every transport ending is an Err.
    async fn pump(
        &self,
        url: &str,
        tx: &mpsc::Sender<SessionEvent>,
    ) -> Result<(), TransportError> {
        let response = utils::build_events_request(&self.http, url)
            .send()
            .await
            .map_err(|source| TransportError::Connect {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status()));
        }

        tracing::info!("push stream opened: {}", url);
        if !self.set_status(ConnectionStatus::Connected, tx).await {
            return Ok(());
        }

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(TransportError::Stream)?;
            for payload in decoder.push(&chunk) {
                match utils::decode_frame(&payload) {
                    Ok(event) => {
                        tracing::debug!("received frame: {}", event.kind());
                        self.update_stats(|stats| stats.record_frame());
                        if tx.send(SessionEvent::Inbound(event)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        self.update_stats(|stats| stats.record_dropped_frame());
                        tracing::warn!(
                            "{}, payload=> {:?}",
                            TransportError::from(e),
                            payload
                        );
                    }
                }
            }
        }
        Err(TransportError::Closed)
    }
}

#[async_trait]
impl EnvelopeSink for Client {
    async fn send(&self, envelope: OutboundEnvelope) -> Result<(), SendError> {
        Client::send(self, envelope).await
    }
}

/// Creates a client from `config` and opens its push stream.
pub fn connect_with_config(config: Config, audio_mode: bool) -> (Client, InboundStream) {
    let client = Client::new(config);
    let stream = client.open(audio_mode);
    (client, stream)
}

/// Connects with the default, environment-derived config in text mode.
pub fn connect() -> (Client, InboundStream) {
    connect_with_config(Config::new(), false)
}
