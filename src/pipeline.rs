//! Top-level session controller.
//!
//! One task owns the transport, the reassembler and, while audio mode is on,
//! the audio session. Callers drive it with [`PipelineCommand`]s and observe it
//! through [`PipelineEvent`]s.

use adk_stream_types::{MimeType, OutboundEnvelope};
use adk_stream_utils::{MediaBackend, MediaError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::{Client, ConnectionStatus, EnvelopeSink, InboundStream, SessionEvent};
use crate::error::SendError;
use crate::reassembler::{Message, MessageUpdate, TurnReassembler};

mod audio;
mod outbox;

use audio::{AudioSession, AudioWake, PendingPlayback};
use outbox::Outbox;

pub const CONNECTION_OPENED: &str = "Connection opened";
pub const CONNECTION_CLOSED: &str = "Connection closed";
pub const AUDIO_STOPPED: &str = "Audio conversation stopped";

pub const TEXT_DISABLED_IN_AUDIO_MODE: &str = "text input is disabled in audio mode";
pub const TEXT_DISABLED_WHILE_DISCONNECTED: &str = "text input is disabled while disconnected";

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCommand {
    SubmitText(String),
    StartAudio,
    StopAudio,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Status(ConnectionStatus),
    /// System notice for the transcript.
    Notice(String),
    MessageStarted(Message),
    MessageUpdated(Message),
    SendFailed { mime_type: MimeType, reason: String },
    /// Audio mode could not start; text mode is unaffected.
    MediaUnavailable(MediaError),
}

/// Caller side of a running pipeline.
pub struct PipelineHandle {
    commands: mpsc::Sender<PipelineCommand>,
    events: mpsc::UnboundedReceiver<PipelineEvent>,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    pub async fn command(&self, command: PipelineCommand) -> Result<(), SendError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SendError::Closed)
    }

    pub async fn submit_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.command(PipelineCommand::SubmitText(text.into())).await
    }

    pub async fn start_audio(&self) -> Result<(), SendError> {
        self.command(PipelineCommand::StartAudio).await
    }

    pub async fn stop_audio(&self) -> Result<(), SendError> {
        self.command(PipelineCommand::StopAudio).await
    }

    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Tears the session down and waits for the controller to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(PipelineCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::error!("pipeline task failed: {}", e);
        }
    }
}

/// Starts the controller for `client` in text mode.
pub fn spawn<B>(client: Client, backend: B) -> PipelineHandle
where
    B: MediaBackend + 'static,
{
    let capacity = client.config().channel_capacity();
    let (commands_tx, commands_rx) = mpsc::channel(capacity);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let pipeline = Pipeline {
        outbox: Outbox::spawn(client.clone(), capacity, events_tx.clone()),
        pending: PendingPlayback::new(client.config().pending_playback_capacity()),
        reassembler: TurnReassembler::new(),
        inbound: None,
        status: ConnectionStatus::Disconnected,
        audio: None,
        backend,
        commands: commands_rx,
        events: events_tx,
        client,
    };
    let task = tokio::spawn(pipeline.run());

    PipelineHandle {
        commands: commands_tx,
        events: events_rx,
        task,
    }
}

struct Pipeline<B> {
    client: Client,
    inbound: Option<InboundStream>,
    status: ConnectionStatus,
    reassembler: TurnReassembler,
    audio: Option<AudioSession>,
    pending: PendingPlayback,
    outbox: Outbox,
    backend: B,
    commands: mpsc::Receiver<PipelineCommand>,
    events: mpsc::UnboundedSender<PipelineEvent>,
}

impl<B: MediaBackend> Pipeline<B> {
    async fn run(mut self) {
        tracing::info!("pipeline started for session {}", self.client.session_id());
        self.reopen_inbound(false);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(PipelineCommand::SubmitText(text)) => self.submit_text(text).await,
                    Some(PipelineCommand::StartAudio) => self.start_audio(),
                    Some(PipelineCommand::StopAudio) => self.stop_audio().await,
                    Some(PipelineCommand::Shutdown) | None => {
                        self.shutdown();
                        break;
                    }
                },
                event = next_inbound(&mut self.inbound) => match event {
                    Some(event) => self.handle_session_event(event),
                    None => {
                        tracing::warn!("push stream ended unexpectedly, reopening");
                        let audio_mode = self.audio.is_some();
                        self.reopen_inbound(audio_mode);
                    }
                },
                wake = next_audio_wake(&mut self.audio) => self.handle_audio_wake(wake).await,
            }
        }
        tracing::info!("pipeline stopped for session {}", self.client.session_id());
    }

    fn emit(&self, event: PipelineEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("pipeline event receiver dropped");
        }
    }

    fn reopen_inbound(&mut self, audio_mode: bool) {
        if let Some(stream) = self.inbound.take() {
            stream.close();
        }
        tracing::info!("opening push stream, audio mode: {}", audio_mode);
        self.status = ConnectionStatus::Connecting;
        self.inbound = Some(self.client.open(audio_mode));
    }

    async fn submit_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let blocked = if self.audio.is_some() {
            Some(TEXT_DISABLED_IN_AUDIO_MODE)
        } else if self.status == ConnectionStatus::Disconnected {
            Some(TEXT_DISABLED_WHILE_DISCONNECTED)
        } else {
            None
        };
        if let Some(reason) = blocked {
            tracing::warn!("rejecting text input: {}", reason);
            self.emit(PipelineEvent::SendFailed {
                mime_type: MimeType::TextPlain,
                reason: reason.to_string(),
            });
            return;
        }
        let message = self.reassembler.submit_user_text(text.as_str()).clone();
        self.emit(PipelineEvent::MessageStarted(message));
        if let Err(e) = self.outbox.send(OutboundEnvelope::Text(text)).await {
            self.emit(PipelineEvent::SendFailed {
                mime_type: MimeType::TextPlain,
                reason: e.to_string(),
            });
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Status(status) => {
                self.status = status;
                self.emit(PipelineEvent::Status(status));
                match status {
                    ConnectionStatus::Connected => {
                        self.emit(PipelineEvent::Notice(CONNECTION_OPENED.to_string()))
                    }
                    ConnectionStatus::Disconnected => {
                        self.emit(PipelineEvent::Notice(CONNECTION_CLOSED.to_string()))
                    }
                    ConnectionStatus::Connecting => {}
                }
            }
            SessionEvent::Inbound(event) => {
                let update = match self.audio.as_mut() {
                    Some(audio) => self.reassembler.handle(event, audio.playback()),
                    None => self.reassembler.handle(event, &mut self.pending),
                };
                let event = match update {
                    Some(MessageUpdate::Started(id)) => {
                        self.reassembler.message(id).cloned().map(PipelineEvent::MessageStarted)
                    }
                    Some(MessageUpdate::Appended(id)) => {
                        self.reassembler.message(id).cloned().map(PipelineEvent::MessageUpdated)
                    }
                    None => None,
                };
                if let Some(event) = event {
                    self.emit(event);
                }
            }
        }
    }

    async fn handle_audio_wake(&mut self, wake: AudioWake) {
        match wake {
            AudioWake::Frame(samples) => {
                if let Some(audio) = self.audio.as_mut() {
                    audio.on_capture_frame(&samples);
                }
            }
            AudioWake::Tick => {
                let result = match self.audio.as_mut() {
                    Some(audio) => audio.batcher().flush(&self.outbox).await,
                    None => Ok(false),
                };
                if let Err(e) = result {
                    self.emit(PipelineEvent::SendFailed {
                        mime_type: MimeType::AudioPcm,
                        reason: e.to_string(),
                    });
                }
            }
            AudioWake::CaptureClosed => {
                tracing::warn!("capture source closed, leaving audio mode");
                self.stop_audio().await;
            }
        }
    }

    fn start_audio(&mut self) {
        if self.audio.is_some() {
            tracing::debug!("audio mode already on");
            return;
        }

        let mut audio = match AudioSession::start(&mut self.backend, self.client.config()) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!("cannot start audio mode: {}", e);
                self.emit(PipelineEvent::MediaUnavailable(e));
                return;
            }
        };
        self.pending.drain_into(audio.playback());
        self.audio = Some(audio);
        self.reopen_inbound(true);
        tracing::info!("audio mode started");
    }

    // Deliberate stop: the last partial batch is still sent.
    async fn stop_audio(&mut self) {
        let Some(mut audio) = self.audio.take() else {
            tracing::debug!("audio mode already off");
            return;
        };

        audio.batcher().stop();
        audio.drain_capture();
        if let Err(e) = audio.batcher().flush(&self.outbox).await {
            self.emit(PipelineEvent::SendFailed {
                mime_type: MimeType::AudioPcm,
                reason: e.to_string(),
            });
        }
        audio.stop_capture();
        self.reopen_inbound(false);
        audio.stop_playback();

        tracing::info!("audio mode stopped");
        self.emit(PipelineEvent::Notice(AUDIO_STOPPED.to_string()));
    }

    // Hard teardown: pending capture is discarded.
    fn shutdown(&mut self) {
        let mut audio = self.audio.take();
        if let Some(audio) = audio.as_mut() {
            audio.batcher().stop();
            audio.batcher().discard();
            audio.stop_capture();
        }
        if let Some(stream) = self.inbound.take() {
            stream.close();
        }
        if let Some(audio) = audio {
            audio.stop_playback();
        }
        self.outbox.stop();
    }
}

async fn next_inbound(inbound: &mut Option<InboundStream>) -> Option<SessionEvent> {
    match inbound {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_audio_wake(audio: &mut Option<AudioSession>) -> AudioWake {
    match audio {
        Some(audio) => audio.next_wake().await,
        None => std::future::pending().await,
    }
}
