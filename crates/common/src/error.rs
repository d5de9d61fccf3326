use thiserror::Error;

/// Error types for the tunnel agent
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Control-channel open/close failures. Fatal before the tunnel is
    /// established, recoverable (via reconnection) afterwards.
    #[error("Connection error: {0}")]
    Transport(String),

    #[error("Cannot connect to local service on port {0}. Is your service running?")]
    LocalServiceDown(u16),

    #[error("Request to local service timed out")]
    LocalServiceTimeout,

    /// Malformed inbound frame. Logged and dropped; the channel stays open.
    #[error("Invalid message format: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(String),

    /// Reconnection ceiling reached. The process exits non-zero.
    #[error("Giving up after {0} failed reconnection attempts")]
    ExhaustedRetries(u32),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;
