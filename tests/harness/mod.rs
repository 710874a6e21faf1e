//! Shared test harness: mock capture, mock media engine, and the
//! scripted signaling server.

pub mod signal_server;

use async_trait::async_trait;
use jambox_client::engine::{EngineTransport, MediaEngine, TransportNegotiator};
use jambox_client::media::{AudioTrack, CaptureSource, RemoteStream};
use jambox_client::types::{
    ClientCapabilities, ConsumerOptions, DtlsParameters, MediaKind, ProducerId,
    RouterCapabilities, RtpParameters, TransportId, TransportOptions, TransportRole,
    TransportState,
};
use jambox_client::{Error, Result};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Initialize logging for a test run. Repeat calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Local track that counts stop() calls
pub struct MockTrack {
    pub stops: AtomicU32,
}

impl AudioTrack for MockTrack {
    fn id(&self) -> &str {
        "mock-track"
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Capture source handing out one shared mock track
pub struct MockCapture {
    pub track: Arc<MockTrack>,
}

impl MockCapture {
    pub fn new() -> Self {
        Self {
            track: Arc::new(MockTrack {
                stops: AtomicU32::new(0),
            }),
        }
    }
}

#[async_trait]
impl CaptureSource for MockCapture {
    async fn acquire(&self) -> Result<Arc<dyn AudioTrack>> {
        Ok(self.track.clone())
    }
}

/// Capture source that always fails, for bootstrap-failure paths
pub struct FailingCapture;

#[async_trait]
impl CaptureSource for FailingCapture {
    async fn acquire(&self) -> Result<Arc<dyn AudioTrack>> {
        Err(Error::Acquisition("microphone unavailable".to_string()))
    }
}

/// Remote stream that counts close() calls
pub struct MockStream {
    pub consumer_id: String,
    pub closes: AtomicU32,
}

impl RemoteStream for MockStream {
    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Engine transport that drives its negotiator on first use and counts
/// close() calls
pub struct MockTransport {
    id: TransportId,
    role: TransportRole,
    negotiator: Arc<dyn TransportNegotiator>,
    state: Mutex<TransportState>,
    engine: Arc<MockEngineInner>,
    pub closes: AtomicU32,
}

impl MockTransport {
    fn begin_connect(&self) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match *state {
            TransportState::Closed => Err(Error::TransportUnavailable(self.id.to_string())),
            TransportState::Connected | TransportState::Connecting => Ok(false),
            TransportState::New => {
                *state = TransportState::Connecting;
                Ok(true)
            }
        }
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.begin_connect()? {
            self.negotiator
                .connect_transport(&self.id, DtlsParameters(json!({"fingerprint": "mock"})))
                .await?;
            *self.state.lock().unwrap() = TransportState::Connected;
        }
        Ok(())
    }
}

#[async_trait]
impl EngineTransport for MockTransport {
    fn id(&self) -> &TransportId {
        &self.id
    }

    fn state(&self) -> TransportState {
        *self.state.lock().unwrap()
    }

    async fn produce(&self, _track: Arc<dyn AudioTrack>) -> Result<ProducerId> {
        if self.role != TransportRole::Send {
            return Err(Error::Engine("produce on recv transport".to_string()));
        }
        self.ensure_connected().await?;
        self.negotiator
            .produce(&self.id, MediaKind::Audio, RtpParameters(json!({})))
            .await
    }

    async fn consume(&self, options: &ConsumerOptions) -> Result<Arc<dyn RemoteStream>> {
        if self.role != TransportRole::Recv {
            return Err(Error::Engine("consume on send transport".to_string()));
        }
        self.ensure_connected().await?;

        let stream = Arc::new(MockStream {
            consumer_id: options.id.to_string(),
            closes: AtomicU32::new(0),
        });
        self.engine.streams.lock().unwrap().push(stream.clone());
        Ok(stream)
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if *state != TransportState::Closed {
            *state = TransportState::Closed;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[derive(Default)]
struct MockEngineInner {
    loads: AtomicU32,
    transports: Mutex<Vec<Arc<MockTransport>>>,
    streams: Mutex<Vec<Arc<MockStream>>>,
}

/// Media engine whose transports and streams are inspectable after the
/// session is done with them
#[derive(Clone, Default)]
pub struct MockEngine {
    inner: Arc<MockEngineInner>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times load() ran
    pub fn loads(&self) -> u32 {
        self.inner.loads.load(Ordering::SeqCst)
    }

    /// Every transport the engine instantiated, in creation order
    pub fn transports(&self) -> Vec<Arc<MockTransport>> {
        self.inner.transports.lock().unwrap().clone()
    }

    /// Every remote stream the engine instantiated, in creation order
    pub fn streams(&self) -> Vec<Arc<MockStream>> {
        self.inner.streams.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn load(&self, _router_capabilities: &RouterCapabilities) -> Result<()> {
        self.inner.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn local_capabilities(&self) -> Result<ClientCapabilities> {
        Ok(ClientCapabilities(json!({"codecs": ["opus"]})))
    }

    async fn create_transport(
        &self,
        role: TransportRole,
        options: &TransportOptions,
        negotiator: Arc<dyn TransportNegotiator>,
    ) -> Result<Arc<dyn EngineTransport>> {
        let transport = Arc::new(MockTransport {
            id: options.id.clone(),
            role,
            negotiator,
            state: Mutex::new(TransportState::New),
            engine: self.inner.clone(),
            closes: AtomicU32::new(0),
        });
        self.inner.transports.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}
