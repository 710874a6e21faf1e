//! Configuration for a conferencing session

use crate::types::RoomId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-request signaling timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default capacity of the session event channel
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Configuration for a [`Session`](crate::session::Session)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// WebSocket signaling server URL (ws:// or wss://)
    pub signaling_url: String,

    /// Room to join
    pub room: RoomId,

    /// Per-request signaling timeout in milliseconds (default: 10000).
    ///
    /// A request that gets no reply within this window resolves to
    /// [`Error::RequestTimeout`](crate::Error::RequestTimeout) instead of
    /// hanging the session.
    pub request_timeout_ms: u64,

    /// Capacity of the session event channel (default: 64)
    pub event_buffer: usize,
}

impl SessionConfig {
    /// Create a configuration with defaults for the given server and room
    pub fn new(signaling_url: impl Into<String>, room: impl Into<RoomId>) -> Self {
        Self {
            signaling_url: signaling_url.into(),
            room: room.into(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Per-request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the signaling URL or room
    /// identifier is empty, or the timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.signaling_url.is_empty() {
            return Err(Error::InvalidConfig(
                "signaling_url must not be empty".to_string(),
            ));
        }

        if self.room.as_str().is_empty() {
            return Err(Error::InvalidConfig("room must not be empty".to_string()));
        }

        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
