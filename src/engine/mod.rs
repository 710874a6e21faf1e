//! Media engine integration
//!
//! The real-time transport internals (ICE, DTLS, SRTP, packetization)
//! live behind the [`MediaEngine`] trait. The engine negotiates through
//! an inversion-of-control seam: when it needs a server round-trip it
//! calls back into the [`TransportNegotiator`] this crate hands it at
//! transport creation, and suspends until the negotiator resolves.
//!
//! [`EngineHandle`] wraps the engine with the load-once guard: router
//! capabilities are applied to the engine at most once per session, no
//! matter how many times a caller asks.

use crate::media::{AudioTrack, RemoteStream};
use crate::types::{
    ClientCapabilities, ConsumerOptions, DtlsParameters, MediaKind, ProducerId,
    RouterCapabilities, RtpParameters, TransportId, TransportOptions, TransportRole,
    TransportState,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Resolves the engine's negotiation round-trips.
///
/// The engine calls these while setting up a transport, a producer or a
/// consumer, and suspends until the result comes back. Each call maps to
/// exactly one signaling request. A negotiator is handed to the engine
/// once, at transport creation, so hooks cannot be registered twice.
#[async_trait]
pub trait TransportNegotiator: Send + Sync {
    /// Deliver locally generated DTLS parameters to the server.
    ///
    /// Success unblocks the engine's connect sequence; failure aborts it.
    async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<()>;

    /// Announce a locally produced track to the server and obtain the
    /// server-issued producer id.
    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId>;
}

/// A live transport instantiated by the media engine
#[async_trait]
pub trait EngineTransport: Send + Sync {
    /// Server-issued identifier of this transport
    fn id(&self) -> &TransportId;

    /// Current connection state
    fn state(&self) -> TransportState;

    /// Produce the given local track on this transport.
    ///
    /// Drives connect negotiation first when the transport is still New,
    /// so the transport is Connected before the producer exists. Only
    /// valid on a Send transport.
    async fn produce(&self, track: Arc<dyn AudioTrack>) -> Result<ProducerId>;

    /// Instantiate the local receiving half of a consumer from
    /// server-issued parameters. Drives connect negotiation first when
    /// the transport is still New. Only valid on a Recv transport.
    async fn consume(&self, options: &ConsumerOptions) -> Result<Arc<dyn RemoteStream>>;

    /// Close the transport and every producer/consumer it carries.
    ///
    /// Implementations must tolerate repeated calls.
    async fn close(&self) -> Result<()>;
}

/// The opaque capability-negotiating media engine, supplied by the
/// embedding application
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Initialize the engine with the router's capabilities.
    ///
    /// Callers go through [`EngineHandle::load_capabilities`], which
    /// guarantees this runs at most once per session.
    async fn load(&self, router_capabilities: &RouterCapabilities) -> Result<()>;

    /// The engine's local capabilities. Only valid after [`load`](Self::load).
    fn local_capabilities(&self) -> Result<ClientCapabilities>;

    /// Instantiate a transport from server-issued parameters, wiring its
    /// negotiation callbacks to the given negotiator.
    async fn create_transport(
        &self,
        role: TransportRole,
        options: &TransportOptions,
        negotiator: Arc<dyn TransportNegotiator>,
    ) -> Result<Arc<dyn EngineTransport>>;
}

/// Session-scoped handle around the media engine.
///
/// Owns the `loaded` flag the engine invariant hangs on: a duplicate
/// join reply or a repeated bootstrap pass must never re-run the
/// engine's load, which would corrupt its internal negotiation state.
pub struct EngineHandle {
    engine: Arc<dyn MediaEngine>,
    loaded: AtomicBool,
    local_capabilities: OnceLock<ClientCapabilities>,
}

impl EngineHandle {
    /// Wrap an engine supplied by the embedding application
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            engine,
            loaded: AtomicBool::new(false),
            local_capabilities: OnceLock::new(),
        }
    }

    /// Load router capabilities into the engine, at most once.
    ///
    /// The first call loads the engine and caches its local
    /// capabilities; every later call returns immediately without
    /// touching engine state.
    pub async fn load_capabilities(&self, router_capabilities: &RouterCapabilities) -> Result<()> {
        if self.loaded.load(Ordering::SeqCst) {
            debug!("Engine already loaded, skipping capability load");
            return Ok(());
        }

        self.engine.load(router_capabilities).await?;
        let capabilities = self.engine.local_capabilities()?;
        let _ = self.local_capabilities.set(capabilities);
        self.loaded.store(true, Ordering::SeqCst);

        debug!("Engine capabilities loaded");
        Ok(())
    }

    /// Whether the engine has been loaded
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// The engine's local capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineNotLoaded`] when called before
    /// [`load_capabilities`](Self::load_capabilities) succeeded.
    pub fn local_capabilities(&self) -> Result<ClientCapabilities> {
        self.local_capabilities
            .get()
            .cloned()
            .ok_or(Error::EngineNotLoaded)
    }

    /// Instantiate a transport through the underlying engine
    pub async fn create_transport(
        &self,
        role: TransportRole,
        options: &TransportOptions,
        negotiator: Arc<dyn TransportNegotiator>,
    ) -> Result<Arc<dyn EngineTransport>> {
        if !self.is_loaded() {
            return Err(Error::EngineNotLoaded);
        }

        self.engine.create_transport(role, options, negotiator).await
    }
}
