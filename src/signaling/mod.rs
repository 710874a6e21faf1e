//! Signaling layer: typed request/response and event delivery over one
//! persistent WebSocket connection

pub mod channel;
pub mod protocol;

pub use channel::{SignalingChannel, SignalingRequests};
pub use protocol::ServerEvent;
