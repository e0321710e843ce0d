/// Payload kind carried by a frame's `data` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MimeType {
    /// Base64 encoded little-endian PCM16 audio.
    #[serde(rename = "audio/pcm")]
    AudioPcm,
    /// A UTF-8 text fragment.
    #[serde(rename = "text/plain")]
    TextPlain,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::AudioPcm => "audio/pcm",
            MimeType::TextPlain => "text/plain",
        }
    }
}

/// One JSON object received on the push stream.
///
/// Exactly one of `turn_complete`, `interrupted` or the `(mime_type, data)` pair
/// is expected to carry meaning; everything else is left to the decoder.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ServerFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    turn_complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interrupted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime_type: Option<MimeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

impl ServerFrame {
    pub fn turn_complete() -> Self {
        Self {
            turn_complete: Some(true),
            ..Default::default()
        }
    }

    pub fn interrupted() -> Self {
        Self {
            interrupted: Some(true),
            ..Default::default()
        }
    }

    pub fn payload(mime_type: MimeType, data: impl Into<String>) -> Self {
        Self {
            mime_type: Some(mime_type),
            data: Some(data.into()),
            ..Default::default()
        }
    }

    pub fn is_turn_complete(&self) -> bool {
        self.turn_complete == Some(true)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted == Some(true)
    }

    pub fn mime_type(&self) -> Option<MimeType> {
        self.mime_type
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn into_data(self) -> Option<String> {
        self.data
    }
}

/// Body of one outbound send request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClientMessage {
    mime_type: MimeType,
    data: String,
}

impl ClientMessage {
    pub fn new(mime_type: MimeType, data: impl Into<String>) -> Self {
        Self {
            mime_type,
            data: data.into(),
        }
    }

    pub fn mime_type(&self) -> MimeType {
        self.mime_type
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}
