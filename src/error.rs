//! Error types for session orchestration

/// Result type alias using the session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating a session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local capture device could not be acquired
    #[error("Capture acquisition failed: {0}")]
    Acquisition(String),

    /// Signaling channel not connected or request could not be sent
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// The server rejected a signaling request
    #[error("Server rejected request: {0}")]
    ServerRejected(String),

    /// A signaling request got no reply within the configured timeout
    #[error("Request timed out: {0}")]
    RequestTimeout(String),

    /// Connect- or produce-negotiation was rejected
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// The media engine was used before its capabilities were loaded
    #[error("Media engine not loaded")]
    EngineNotLoaded,

    /// Media engine operation failed
    #[error("Media engine error: {0}")]
    Engine(String),

    /// A second transport of the same role was requested
    #[error("Transport already exists for role: {0}")]
    TransportExists(String),

    /// A transport was required but has not been created or is closed
    #[error("Transport not available: {0}")]
    TransportUnavailable(String),

    /// A second local producer was requested
    #[error("Producer already exists: {0}")]
    ProducerExists(String),

    /// Session is not in a state that allows the operation
    #[error("Session error: {0}")]
    Session(String),

    /// Invalid data received on the signaling channel
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check whether this error is tolerable for a single peer's
    /// consumption: the peer is skipped and the session continues.
    pub fn is_per_peer(&self) -> bool {
        matches!(
            self,
            Error::ServerRejected(_)
                | Error::RequestTimeout(_)
                | Error::Negotiation(_)
                | Error::InvalidData(_)
        )
    }

    /// Check whether this error came from the signaling layer
    pub fn is_signaling(&self) -> bool {
        matches!(
            self,
            Error::Signaling(_)
                | Error::ServerRejected(_)
                | Error::RequestTimeout(_)
                | Error::WebSocket(_)
        )
    }
}
