//! JSON-RPC 2.0 signaling protocol types
//!
//! Every request carries the active room identifier; replies correlate
//! by request id. Server-pushed room membership events are JSON-RPC
//! notifications (no id).

use crate::types::{
    ClientCapabilities, ConsumerId, DtlsParameters, MediaKind, PeerId, ProducerId, RoomId,
    RtpParameters, TransportId, TransportRole,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// JSON-RPC 2.0 protocol version
pub const JSONRPC_VERSION: &str = "2.0";

/// Request method names
pub mod methods {
    /// Join a room; replies with our peer id and the current member list
    pub const JOIN: &str = "join";
    /// Fetch the router's media capabilities
    pub const GET_ROUTER_CAPABILITIES: &str = "get-router-capabilities";
    /// Allocate a server-side transport
    pub const CREATE_TRANSPORT: &str = "create-transport";
    /// Deliver DTLS parameters for a transport
    pub const CONNECT_TRANSPORT: &str = "connect-transport";
    /// Announce a locally produced track
    pub const PRODUCE: &str = "produce";
    /// Request forwarding of a remote peer's track
    pub const CONSUME: &str = "consume";
    /// Start forwarding on a paused consumer
    pub const RESUME: &str = "resume";
}

/// Server event method names
pub mod events {
    /// A peer started producing; its track is available to consume
    pub const NEW_PRODUCER: &str = "new-producer";
    /// A peer left the room
    pub const PEER_LEFT: &str = "peer-left";
}

/// JSON-RPC 2.0 request sent to the signaling server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRequest {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,

    /// Method name to invoke
    pub method: String,

    /// Method parameters
    pub params: serde_json::Value,

    /// Request ID for matching with the reply
    pub id: String,
}

impl ClientRequest {
    /// Build a request with a fresh correlation id
    pub fn new(method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Serialize to the wire format
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    /// Error code
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Any message received from the signaling server.
///
/// Replies carry an `id` plus either `result` or `error`; notifications
/// carry a `method` and no `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    /// Protocol version
    pub jsonrpc: String,

    /// Correlation id (present on replies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Result payload (success replies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error payload (failure replies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,

    /// Event method name (notifications)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Event parameters (notifications)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl ServerMessage {
    /// Parse a wire message
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A typed room membership event pushed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A peer started producing a track
    NewProducer(PeerId),
    /// A peer left the room
    PeerLeft(PeerId),
}

impl ServerEvent {
    /// Decode a notification into a typed event.
    ///
    /// Returns `Ok(None)` for methods this client does not handle.
    pub fn from_notification(
        method: &str,
        params: &serde_json::Value,
    ) -> Result<Option<ServerEvent>> {
        match method {
            events::NEW_PRODUCER => {
                let params: PeerEventParams = serde_json::from_value(params.clone())
                    .map_err(|e| Error::InvalidData(format!("Invalid new-producer params: {}", e)))?;
                Ok(Some(ServerEvent::NewProducer(params.peer_id)))
            }
            events::PEER_LEFT => {
                let params: PeerEventParams = serde_json::from_value(params.clone())
                    .map_err(|e| Error::InvalidData(format!("Invalid peer-left params: {}", e)))?;
                Ok(Some(ServerEvent::PeerLeft(params.peer_id)))
            }
            _ => Ok(None),
        }
    }
}

/// Parameters carried by peer membership events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerEventParams {
    /// The peer the event concerns
    pub peer_id: PeerId,
}

/// Parameters for `join`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinParams {
    /// Room to join
    pub room: RoomId,
}

/// Reply to `join`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinReply {
    /// Our server-assigned peer id
    pub peer_id: PeerId,

    /// Peers already in the room
    #[serde(default)]
    pub peer_ids: Vec<PeerId>,
}

/// Parameters for `get-router-capabilities`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterCapabilitiesParams {
    /// Active room
    pub room: RoomId,
}

/// Parameters for `create-transport`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateTransportParams {
    /// Active room
    pub room: RoomId,

    /// Direction the transport will carry media in
    pub role: TransportRole,
}

/// Parameters for `connect-transport`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectTransportParams {
    /// Active room
    pub room: RoomId,

    /// Transport being connected
    pub transport_id: TransportId,

    /// Locally generated DTLS parameters
    pub dtls_parameters: DtlsParameters,
}

/// Parameters for `produce`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProduceParams {
    /// Active room
    pub room: RoomId,

    /// Transport the track is produced on
    pub transport_id: TransportId,

    /// Kind of the produced track
    pub kind: MediaKind,

    /// RTP parameters of the produced track
    pub rtp_parameters: RtpParameters,
}

/// Reply to `produce`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProduceReply {
    /// Server-issued producer id
    pub producer_id: ProducerId,
}

/// Parameters for `consume`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumeParams {
    /// Active room
    pub room: RoomId,

    /// Peer whose track we want to consume
    pub peer_id: PeerId,

    /// Our capabilities, so the server can match parameters
    pub rtp_capabilities: ClientCapabilities,
}

/// Parameters for `resume`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumeParams {
    /// Active room
    pub room: RoomId,

    /// Consumer to start forwarding on
    pub consumer_id: ConsumerId,
}
