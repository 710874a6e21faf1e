//! Transport pair management
//!
//! Exactly one Send and one Recv transport exist for the session
//! lifetime. Two transports of the same role collide on media-line
//! identifiers inside the engine's negotiation, so a second creation of
//! a role is rejected outright, never retried. The engine's
//! connect/produce callbacks are proxied through the signaling channel
//! by a [`SignalingNegotiator`] handed over once, at creation.

use crate::consumer::Consumer;
use crate::engine::{EngineHandle, EngineTransport, TransportNegotiator};
use crate::signaling::channel::SignalingRequests;
use crate::signaling::protocol::{
    methods, ConnectTransportParams, ConsumeParams, CreateTransportParams, ProduceParams,
    ProduceReply, ResumeParams,
};
use crate::types::{
    ConsumerId, ConsumerOptions, DtlsParameters, MediaKind, PeerId, ProducerId, RoomId,
    RtpParameters, TransportId, TransportOptions, TransportRole, TransportState,
};
use crate::media::AudioTrack;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Proxies one transport's negotiation round-trips through the
/// signaling channel
pub struct SignalingNegotiator {
    channel: Arc<dyn SignalingRequests>,
    room: RoomId,
    role: TransportRole,
}

#[async_trait]
impl TransportNegotiator for SignalingNegotiator {
    async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<()> {
        debug!(transport_id = %transport_id, role = %self.role, "Connect negotiation");

        let params = ConnectTransportParams {
            room: self.room.clone(),
            transport_id: transport_id.clone(),
            dtls_parameters,
        };

        self.channel
            .request(methods::CONNECT_TRANSPORT, serde_json::to_value(params)?)
            .await
            .map_err(|e| {
                Error::Negotiation(format!(
                    "connect-transport for {} rejected: {}",
                    transport_id, e
                ))
            })?;

        Ok(())
    }

    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId> {
        if self.role != TransportRole::Send {
            return Err(Error::Negotiation(
                "produce negotiation on a recv transport".to_string(),
            ));
        }

        debug!(transport_id = %transport_id, "Produce negotiation");

        let params = ProduceParams {
            room: self.room.clone(),
            transport_id: transport_id.clone(),
            kind,
            rtp_parameters,
        };

        let result = self
            .channel
            .request(methods::PRODUCE, serde_json::to_value(params)?)
            .await
            .map_err(|e| {
                Error::Negotiation(format!("produce on {} rejected: {}", transport_id, e))
            })?;

        let reply: ProduceReply = serde_json::from_value(result)?;
        Ok(reply.producer_id)
    }
}

/// Owns the session's Send/Recv transport pair and its single producer
pub struct TransportPair {
    channel: Arc<dyn SignalingRequests>,
    engine: Arc<EngineHandle>,
    room: RoomId,
    send: RwLock<Option<Arc<dyn EngineTransport>>>,
    recv: RwLock<Option<Arc<dyn EngineTransport>>>,
    producer: RwLock<Option<ProducerId>>,
}

impl TransportPair {
    /// Create an empty pair bound to the channel and engine
    pub fn new(
        channel: Arc<dyn SignalingRequests>,
        engine: Arc<EngineHandle>,
        room: RoomId,
    ) -> Self {
        Self {
            channel,
            engine,
            room,
            send: RwLock::new(None),
            recv: RwLock::new(None),
            producer: RwLock::new(None),
        }
    }

    /// Create the session's single Send transport
    pub async fn create_send_transport(&self) -> Result<()> {
        self.create_transport(TransportRole::Send, &self.send).await
    }

    /// Create the session's single Recv transport
    pub async fn create_recv_transport(&self) -> Result<()> {
        self.create_transport(TransportRole::Recv, &self.recv).await
    }

    async fn create_transport(
        &self,
        role: TransportRole,
        slot: &RwLock<Option<Arc<dyn EngineTransport>>>,
    ) -> Result<()> {
        // Hold the slot across the round-trip so a duplicate creation
        // attempt cannot slip in while the first is in flight.
        let mut slot = slot.write().await;
        if slot.is_some() {
            return Err(Error::TransportExists(role.to_string()));
        }

        let params = CreateTransportParams {
            room: self.room.clone(),
            role,
        };

        let result = self
            .channel
            .request(methods::CREATE_TRANSPORT, serde_json::to_value(params)?)
            .await?;
        let options: TransportOptions = serde_json::from_value(result)?;

        let negotiator = Arc::new(SignalingNegotiator {
            channel: Arc::clone(&self.channel),
            room: self.room.clone(),
            role,
        });

        let transport = self
            .engine
            .create_transport(role, &options, negotiator)
            .await?;

        info!(transport_id = %options.id, role = %role, "Transport created");
        *slot = Some(transport);
        Ok(())
    }

    /// Produce the local audio track on the Send transport.
    ///
    /// At most one producer exists per session. The engine drives
    /// connect negotiation first, so the transport is Connected before
    /// the producer id comes back.
    pub async fn produce_local_audio(&self, track: Arc<dyn AudioTrack>) -> Result<ProducerId> {
        let transport = self.send.read().await.clone().ok_or_else(|| {
            Error::TransportUnavailable("send transport not created".to_string())
        })?;

        if transport.state() == TransportState::Closed {
            return Err(Error::TransportUnavailable(
                "send transport is closed".to_string(),
            ));
        }

        let mut producer = self.producer.write().await;
        if let Some(existing) = producer.as_ref() {
            return Err(Error::ProducerExists(existing.to_string()));
        }

        let id = transport.produce(track).await?;
        info!(producer_id = %id, "Local audio producing");
        *producer = Some(id.clone());
        Ok(id)
    }

    /// Negotiate consumption of a remote peer's track.
    ///
    /// `Ok(None)` means the server declined (capability mismatch or the
    /// peer is already gone); not an error, the peer is skipped. On
    /// success the consumer comes back in `Paused` state; activate it
    /// with [`resume`](Self::resume).
    pub async fn consume(&self, peer_id: &PeerId) -> Result<Option<Consumer>> {
        let transport = self.recv.read().await.clone().ok_or_else(|| {
            Error::TransportUnavailable("recv transport not created".to_string())
        })?;

        if transport.state() == TransportState::Closed {
            return Err(Error::TransportUnavailable(
                "recv transport is closed".to_string(),
            ));
        }

        let params = ConsumeParams {
            room: self.room.clone(),
            peer_id: peer_id.clone(),
            rtp_capabilities: self.engine.local_capabilities()?,
        };

        let result = self
            .channel
            .request(methods::CONSUME, serde_json::to_value(params)?)
            .await?;

        // An empty result is a decline, not an error
        let declined = match &result {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if declined {
            debug!(peer_id = %peer_id, "Server declined consume");
            return Ok(None);
        }

        let options: ConsumerOptions = serde_json::from_value(result)?;
        let stream = transport.consume(&options).await?;

        debug!(consumer_id = %options.id, peer_id = %options.peer_id, "Consumer negotiated (paused)");
        Ok(Some(Consumer::new(options.id, options.peer_id, stream)))
    }

    /// Ask the server to start forwarding on a paused consumer.
    ///
    /// The caller transitions the consumer to Resumed only after this
    /// acknowledgment.
    pub async fn resume(&self, consumer_id: &ConsumerId) -> Result<()> {
        let params = ResumeParams {
            room: self.room.clone(),
            consumer_id: consumer_id.clone(),
        };

        self.channel
            .request(methods::RESUME, serde_json::to_value(params)?)
            .await?;

        debug!(consumer_id = %consumer_id, "Consumer resumed");
        Ok(())
    }

    /// Id of the local producer, if one exists
    pub async fn producer_id(&self) -> Option<ProducerId> {
        self.producer.read().await.clone()
    }

    /// Close both transports. Safe to call on transports already closed
    /// or never created; both slots are attempted even if the first
    /// close fails.
    pub async fn close(&self) {
        for (role, slot) in [("send", &self.send), ("recv", &self.recv)] {
            let transport = slot.write().await.take();
            if let Some(transport) = transport {
                if let Err(e) = transport.close().await {
                    warn!("Error closing {} transport: {}", role, e);
                }
            }
        }
    }
}
