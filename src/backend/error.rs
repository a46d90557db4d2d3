//! Error types for backend calls and the execution channel.

/// Result type for request/response calls to the backend.
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for request/response calls.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend URL is not configured (set backend.url or STEPWISE_BACKEND_URL)")]
    NotConfigured,

    #[error("Invalid backend URL '{0}'")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} failed: {status}")]
    Status { endpoint: String, status: reqwest::StatusCode },

    #[error("Failed to decode {endpoint} response: {message}")]
    Decode { endpoint: String, message: String },

    #[error("No project is open")]
    NoWorkspace,

    #[error("{0}")]
    Other(String),
}

/// Error types for the bidirectional execution channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to open event channel: {0}")]
    Connect(String),

    #[error("Event channel is closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Malformed(#[from] crate::protocol::EventDecodeError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::Closed,
            other => Self::Transport(other.to_string()),
        }
    }
}
