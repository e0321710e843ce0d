pub use adk_stream_utils::MediaError;

/// A push-stream frame that could not be turned into an inbound event.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("frame carries no turn signal and no payload")]
    NoPayload,
}

/// Failure of the inbound push stream.
///
/// Recovered by reconnecting; never fatal to the session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("push stream rejected with status {0}")]
    Status(reqwest::StatusCode),
    #[error("push stream dropped: {0}")]
    Stream(#[source] reqwest::Error),
    #[error("push stream closed by peer")]
    Closed,
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),
}

/// Failure of one outbound send. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("send request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("send rejected with status {0}")]
    Status(reqwest::StatusCode),
    #[error("send channel closed")]
    Closed,
}
