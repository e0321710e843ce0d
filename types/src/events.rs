/// A decoded push-stream frame.
///
/// Events carry no identifier; their position on the stream is the only correlation.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A fragment of the assistant's text for the current turn.
    TextDelta { data: String },
    /// Raw little-endian PCM16 audio, already transport-decoded.
    AudioChunk { pcm16_bytes: Vec<u8> },
    /// The assistant finished its turn.
    TurnComplete,
    /// The assistant's utterance was cut off by new user input.
    Interrupted,
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::TextDelta { .. } => "text_delta",
            InboundEvent::AudioChunk { .. } => "audio_chunk",
            InboundEvent::TurnComplete => "turn_complete",
            InboundEvent::Interrupted => "interrupted",
        }
    }
}

/// One unit of client input sent to the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEnvelope {
    Text(String),
    /// Raw little-endian PCM16 audio, transport-encoded on the wire.
    Audio(Vec<u8>),
}

impl OutboundEnvelope {
    pub fn len(&self) -> usize {
        match self {
            OutboundEnvelope::Text(text) => text.len(),
            OutboundEnvelope::Audio(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
