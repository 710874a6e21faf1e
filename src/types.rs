//! Identifier and negotiation payload types shared across the session

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// View the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

id_type! {
    /// Opaque room identifier chosen by the user
    RoomId
}

id_type! {
    /// Server-assigned peer identifier, unique per signaling connection.
    ///
    /// Not stable across reconnects: a peer that drops and rejoins gets a
    /// fresh PeerId. Never use it as a storage key for consumers.
    PeerId
}

id_type! {
    /// Server-issued transport identifier
    TransportId
}

id_type! {
    /// Server-issued producer identifier
    ProducerId
}

id_type! {
    /// Server-issued consumer identifier, globally unique across peer churn.
    ///
    /// This is the only identifier safe to key consumer storage on.
    ConsumerId
}

/// Router media capabilities advertised by the server.
///
/// Opaque to this crate; forwarded verbatim into the media engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouterCapabilities(pub serde_json::Value);

/// Local capabilities produced by the media engine after loading.
///
/// Opaque to this crate; forwarded verbatim to the server on `consume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientCapabilities(pub serde_json::Value);

/// DTLS parameters produced by the engine during connect negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DtlsParameters(pub serde_json::Value);

/// RTP parameters produced by the engine during produce negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub serde_json::Value);

/// Media kind for a produced or consumed track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track (the only kind this client produces today)
    Audio,
}

/// Direction a transport carries media in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportRole {
    /// Outbound transport: carries the local producer
    Send,
    /// Inbound transport: carries all remote consumers
    Recv,
}

impl fmt::Display for TransportRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportRole::Send => f.write_str("send"),
            TransportRole::Recv => f.write_str("recv"),
        }
    }
}

/// Connection state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, connect negotiation not started
    New,
    /// Connect negotiation in flight
    Connecting,
    /// Connect negotiation acknowledged by the server
    Connected,
    /// Closed; terminal
    Closed,
}

/// Server-issued parameters for instantiating a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportOptions {
    /// Server-issued transport identifier
    pub id: TransportId,

    /// Opaque transport parameters (ICE/DTLS material), forwarded
    /// verbatim into the media engine
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Server-issued parameters for instantiating a consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerOptions {
    /// Server-issued consumer identifier
    pub id: ConsumerId,

    /// Peer whose track this consumer carries
    pub peer_id: PeerId,

    /// Media kind of the consumed track
    pub kind: MediaKind,

    /// RTP parameters for the engine to match
    pub rtp_parameters: RtpParameters,
}

/// Playback state of a consumer.
///
/// Consumers are created `Paused` and activated with an explicit server
/// round-trip so no packets are forwarded before local set-up is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Negotiated but not yet forwarding
    Paused,
    /// Server acknowledged the resume; packets are flowing
    Resumed,
}
