use adk_stream_types::{ClientMessage, InboundEvent, MimeType, OutboundEnvelope, ServerFrame, SessionId};
use adk_stream_utils::audio;
use reqwest::header::{ACCEPT, CACHE_CONTROL};

use crate::client::config::Config;
use crate::client::consts::{EVENTS_PATH, EVENT_STREAM_CONTENT_TYPE, IS_AUDIO_PARAM, SEND_PATH};
use crate::error::FrameError;

pub fn events_url(config: &Config, session_id: &SessionId, audio_mode: bool) -> String {
    format!(
        "{}/{}/{}?{}={}",
        config.base_url(),
        EVENTS_PATH,
        session_id,
        IS_AUDIO_PARAM,
        audio_mode
    )
}

pub fn send_url(config: &Config, session_id: &SessionId) -> String {
    format!("{}/{}/{}", config.base_url(), SEND_PATH, session_id)
}

pub fn build_events_request(http: &reqwest::Client, url: &str) -> reqwest::RequestBuilder {
    http.get(url)
        .header(ACCEPT, EVENT_STREAM_CONTENT_TYPE)
        .header(CACHE_CONTROL, "no-cache")
}

/// Parses one push-stream payload into exactly one event.
pub fn decode_frame(payload: &str) -> Result<InboundEvent, FrameError> {
    let frame: ServerFrame = serde_json::from_str(payload)?;
    if frame.is_turn_complete() {
        return Ok(InboundEvent::TurnComplete);
    }
    if frame.is_interrupted() {
        return Ok(InboundEvent::Interrupted);
    }
    let mime_type = frame.mime_type();
    match (mime_type, frame.into_data()) {
        (Some(_), Some(data)) if data.is_empty() => Err(FrameError::NoPayload),
        (Some(MimeType::AudioPcm), Some(data)) => Ok(InboundEvent::AudioChunk {
            pcm16_bytes: audio::decode_bytes(&data)?,
        }),
        (Some(MimeType::TextPlain), Some(data)) => Ok(InboundEvent::TextDelta { data }),
        _ => Err(FrameError::NoPayload),
    }
}

/// Builds the JSON body for one envelope, transport-encoding audio.
pub fn encode_envelope(envelope: &OutboundEnvelope) -> ClientMessage {
    match envelope {
        OutboundEnvelope::Text(text) => ClientMessage::new(MimeType::TextPlain, text.as_str()),
        OutboundEnvelope::Audio(bytes) => {
            ClientMessage::new(MimeType::AudioPcm, audio::encode_bytes(bytes))
        }
    }
}
