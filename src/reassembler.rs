//! Turns the ordered stream of inbound events into chat messages and playback commands.

use adk_stream_types::InboundEvent;
use adk_stream_utils::audio::pcm16_bytes_to_f32;
use adk_stream_utils::PlaybackSink;
use chrono::{DateTime, Utc};

pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    text: String,
    created_at: DateTime<Utc>,
}

impl Message {
    fn new(id: MessageId, role: Role, text: String) -> Self {
        Self {
            id,
            role,
            text,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Accumulating(MessageId),
}

/// Text change caused by one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageUpdate {
    Started(MessageId),
    Appended(MessageId),
}

/// State machine over the currently open assistant message.
///
/// At most one assistant message is open at a time. Events must be fed in
/// arrival order.
#[derive(Debug, Default)]
pub struct TurnReassembler {
    messages: Vec<Message>,
    current: Option<MessageId>,
    next_id: MessageId,
}

impl TurnReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TurnState {
        match self.current {
            Some(id) => TurnState::Accumulating(id),
            None => TurnState::Idle,
        }
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().rev().find(|message| message.id == id)
    }

    /// Records text typed by the user. The message is complete on creation.
    pub fn submit_user_text(&mut self, text: impl Into<String>) -> &Message {
        let id = self.allocate_id();
        self.messages.push(Message::new(id, Role::User, text.into()));
        &self.messages[self.messages.len() - 1]
    }

    pub fn handle(
        &mut self,
        event: InboundEvent,
        playback: &mut dyn PlaybackSink,
    ) -> Option<MessageUpdate> {
        match event {
            InboundEvent::TextDelta { data } => Some(self.append_text(data)),
            InboundEvent::AudioChunk { pcm16_bytes } => {
                let samples = pcm16_bytes_to_f32(&pcm16_bytes);
                playback.enqueue(&samples);
                None
            }
            InboundEvent::Interrupted => {
                tracing::debug!("assistant interrupted, flushing playback");
                playback.flush();
                None
            }
            InboundEvent::TurnComplete => {
                playback.finish();
                if let Some(id) = self.current.take() {
                    tracing::debug!("turn complete for message {}", id);
                }
                None
            }
        }
    }

    fn append_text(&mut self, data: String) -> MessageUpdate {
        if let Some(id) = self.current {
            if let Some(message) = self.messages.iter_mut().rev().find(|m| m.id == id) {
                message.text.push_str(&data);
                return MessageUpdate::Appended(id);
            }
        }
        let id = self.allocate_id();
        self.messages.push(Message::new(id, Role::Assistant, data));
        self.current = Some(id);
        MessageUpdate::Started(id)
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
