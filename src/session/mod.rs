//! Session orchestration
//!
//! [`Session::join`] takes one local participant from "wants to join
//! room R" to hearing every current and future participant: acquire
//! capture, connect signaling, join the room, load router capabilities,
//! create the Send/Recv transport pair, produce the local track, consume
//! every known peer, then react to membership events until `leave()`.
//!
//! All registry mutation happens on the orchestrator task, one logical
//! thread of control. Round-trips suspend the step they belong to
//! without blocking event processing: known peers are consumed one at a
//! time in join-reply order while `new-producer` / `peer-left` events
//! interleave through `select!`.

use crate::config::SessionConfig;
use crate::consumer::{Consumer, ConsumerRegistry};
use crate::engine::{EngineHandle, MediaEngine};
use crate::media::{CaptureSource, LocalCapture, RemoteStream};
use crate::signaling::protocol::{methods, JoinParams, JoinReply, RouterCapabilitiesParams};
use crate::signaling::{ServerEvent, SignalingChannel};
use crate::transport::TransportPair;
use crate::types::{ConsumerId, PeerId, RouterCapabilities};
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started
    Idle,
    /// Acquiring the local capture track
    AcquiringCapture,
    /// Opening the signaling connection
    ConnectingSignal,
    /// `join` request in flight
    Joining,
    /// Fetching router capabilities and loading the engine
    LoadingCapabilities,
    /// Creating the Send then Recv transport
    CreatingTransports,
    /// Producing the local audio track
    Producing,
    /// Consuming the peers present at join time
    ConsumingKnownPeers,
    /// Steady state: reacting to membership events
    Active,
    /// Teardown in progress
    Leaving,
    /// Terminal: left cleanly
    Closed,
    /// Terminal: bootstrap failed, resources cleaned up
    Failed,
}

/// Events surfaced to the embedding application (UI, playback surfaces)
pub enum SessionEvent {
    /// The room was joined; these peers were already present
    Joined {
        /// Peers present at join time
        peer_ids: Vec<PeerId>,
    },

    /// A remote track is negotiated, resumed, and ready to render
    ConsumerAdded {
        /// Server-issued consumer id (the rendering key)
        consumer_id: ConsumerId,
        /// Owning peer
        peer_id: PeerId,
        /// Opaque stream handle for the playback surface
        stream: Arc<dyn RemoteStream>,
    },

    /// A consumer was removed and its stream closed
    ConsumerRemoved {
        /// Server-issued consumer id
        consumer_id: ConsumerId,
        /// Owning peer
        peer_id: PeerId,
    },

    /// A peer left the room
    PeerLeft {
        /// The departed peer
        peer_id: PeerId,
    },

    /// The session finished teardown
    Left,
}

enum Command {
    Leave(oneshot::Sender<()>),
}

type ConsumeOutcome = (PeerId, Result<Option<Consumer>>);

/// Handle to a running session
pub struct Session {
    command_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<SessionState>,
}

impl Session {
    /// Join a room and run the session until [`leave`](Self::leave).
    ///
    /// Returns the session handle plus the event receiver once the
    /// orchestrator reaches `Active` (every peer present at join time
    /// has had its consumption attempted). Any bootstrap failure tears
    /// down everything acquired so far and surfaces as the error.
    ///
    /// # Arguments
    ///
    /// * `config` - signaling server and room
    /// * `capture` - collaborator producing the local audio track
    /// * `engine` - the opaque media engine
    pub async fn join(
        config: SessionConfig,
        capture: Arc<dyn CaptureSource>,
        engine: Arc<dyn MediaEngine>,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let boot = bootstrap(&config, capture, engine, &state_tx).await?;

        let orchestrator = Orchestrator {
            capture: boot.capture,
            channel: boot.channel,
            transports: boot.transports,
            registry: ConsumerRegistry::new(),
            local_peer: boot.local_peer,
            events_tx,
            state_tx,
        };

        tokio::spawn(orchestrator.run(boot.event_rx, command_rx, boot.known_peers));

        // Hand the handle back once the known-peer pass is done
        let mut active_rx = state_rx.clone();
        let _ = active_rx
            .wait_for(|s| {
                matches!(
                    s,
                    SessionState::Active | SessionState::Closed | SessionState::Failed
                )
            })
            .await;

        Ok((
            Self {
                command_tx,
                state_rx,
            },
            events_rx,
        ))
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Leave the session and tear everything down.
    ///
    /// Safe to call from any state and more than once; resolves when
    /// teardown is complete (immediately if the session is already
    /// closed).
    pub async fn leave(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();

        if self.command_tx.send(Command::Leave(ack_tx)).is_err() {
            // Orchestrator already gone: teardown has run
            return Ok(());
        }

        let _ = ack_rx.await;
        Ok(())
    }
}

struct BootParts {
    capture: LocalCapture,
    channel: Arc<SignalingChannel>,
    transports: Arc<TransportPair>,
    local_peer: PeerId,
    known_peers: Vec<PeerId>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Run the bootstrap sequence, cleaning up every resource acquired so
/// far on any failure.
async fn bootstrap(
    config: &SessionConfig,
    capture_source: Arc<dyn CaptureSource>,
    engine: Arc<dyn MediaEngine>,
    state_tx: &watch::Sender<SessionState>,
) -> Result<BootParts> {
    let set = |s: SessionState| {
        let _ = state_tx.send(s);
    };

    // AcquiringCapture
    set(SessionState::AcquiringCapture);
    let track = match capture_source.acquire().await {
        Ok(track) => track,
        Err(e) => {
            set(SessionState::Failed);
            let e = match e {
                Error::Acquisition(_) => e,
                other => Error::Acquisition(other.to_string()),
            };
            return Err(e);
        }
    };
    let capture = LocalCapture::new(track);

    // ConnectingSignal
    set(SessionState::ConnectingSignal);
    let connected = SignalingChannel::connect(&config.signaling_url, config.request_timeout()).await;
    let (channel, event_rx) = match connected {
        Ok(parts) => parts,
        Err(e) => {
            capture.release();
            set(SessionState::Failed);
            return Err(e);
        }
    };
    let channel = Arc::new(channel);

    // Joining
    set(SessionState::Joining);
    let join_params = JoinParams {
        room: config.room.clone(),
    };
    let reply = match request_join(&channel, join_params).await {
        Ok(reply) => reply,
        Err(e) => {
            abort_cleanup(&capture, &channel, None).await;
            set(SessionState::Failed);
            return Err(e);
        }
    };
    info!(peer_id = %reply.peer_id, peers = reply.peer_ids.len(), "Joined room {}", config.room);

    // LoadingCapabilities
    set(SessionState::LoadingCapabilities);
    let engine = Arc::new(EngineHandle::new(engine));
    let caps_params = RouterCapabilitiesParams {
        room: config.room.clone(),
    };
    let loaded = async {
        let result = channel
            .request(
                methods::GET_ROUTER_CAPABILITIES,
                serde_json::to_value(caps_params)?,
            )
            .await?;
        let router_caps: RouterCapabilities = serde_json::from_value(result)?;
        engine.load_capabilities(&router_caps).await
    }
    .await;
    if let Err(e) = loaded {
        abort_cleanup(&capture, &channel, None).await;
        set(SessionState::Failed);
        return Err(e);
    }

    // CreatingTransports (Send then Recv, one server round-trip each)
    set(SessionState::CreatingTransports);
    let transports = Arc::new(TransportPair::new(
        channel.clone(),
        engine.clone(),
        config.room.clone(),
    ));
    let created = async {
        transports.create_send_transport().await?;
        transports.create_recv_transport().await
    }
    .await;
    if let Err(e) = created {
        abort_cleanup(&capture, &channel, Some(&transports)).await;
        set(SessionState::Failed);
        return Err(e);
    }

    // Producing
    set(SessionState::Producing);
    if let Err(e) = transports.produce_local_audio(capture.track()).await {
        abort_cleanup(&capture, &channel, Some(&transports)).await;
        set(SessionState::Failed);
        return Err(e);
    }

    Ok(BootParts {
        capture,
        channel,
        transports,
        local_peer: reply.peer_id,
        known_peers: reply.peer_ids,
        event_rx,
    })
}

/// Release whatever a failed bootstrap managed to acquire. Same order
/// as leave: transports, signaling, capture. Every step is attempted.
async fn abort_cleanup(
    capture: &LocalCapture,
    channel: &SignalingChannel,
    transports: Option<&TransportPair>,
) {
    if let Some(transports) = transports {
        transports.close().await;
    }
    channel.close();
    capture.release();
}

async fn request_join(channel: &SignalingChannel, params: JoinParams) -> Result<JoinReply> {
    let result = channel
        .request(methods::JOIN, serde_json::to_value(params)?)
        .await?;
    Ok(serde_json::from_value(result)?)
}

/// The single-writer event loop behind a [`Session`]
struct Orchestrator {
    capture: LocalCapture,
    channel: Arc<SignalingChannel>,
    transports: Arc<TransportPair>,
    registry: ConsumerRegistry,
    local_peer: PeerId,
    events_tx: mpsc::Sender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
}

impl Orchestrator {
    async fn run(
        mut self,
        mut server_events: mpsc::UnboundedReceiver<ServerEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        known_peers: Vec<PeerId>,
    ) {
        self.set_state(SessionState::ConsumingKnownPeers);
        self.emit(SessionEvent::Joined {
            peer_ids: known_peers.clone(),
        })
        .await;

        // Peers present at join time, consumed one at a time in the
        // order the server listed them. Membership events interleave
        // freely; the dedupe below keeps both writers idempotent.
        let mut known_queue: VecDeque<PeerId> = known_peers
            .into_iter()
            .filter(|p| *p != self.local_peer)
            .collect();
        let mut known_in_flight: Option<PeerId> = None;

        let mut pending: FuturesUnordered<BoxFuture<'static, ConsumeOutcome>> =
            FuturesUnordered::new();
        let mut pending_peers: HashSet<PeerId> = HashSet::new();
        let mut cancelled: HashSet<PeerId> = HashSet::new();

        loop {
            if self.state() == SessionState::ConsumingKnownPeers && known_in_flight.is_none() {
                while let Some(peer) = known_queue.pop_front() {
                    if self.should_skip(&peer, &pending_peers) {
                        debug!(peer_id = %peer, "Skipping known peer (already handled)");
                        continue;
                    }
                    self.spawn_consume(peer.clone(), &mut pending, &mut pending_peers);
                    known_in_flight = Some(peer);
                    break;
                }

                if known_in_flight.is_none() && known_queue.is_empty() {
                    info!("Known peers consumed, session active");
                    self.set_state(SessionState::Active);
                }
            }

            tokio::select! {
                Some(command) = commands.recv() => match command {
                    Command::Leave(ack) => {
                        self.teardown().await;
                        let _ = ack.send(());
                        return;
                    }
                },

                Some(event) = server_events.recv() => match event {
                    ServerEvent::NewProducer(peer_id) => {
                        self.on_new_producer(peer_id, &mut pending, &mut pending_peers);
                    }
                    ServerEvent::PeerLeft(peer_id) => {
                        known_queue.retain(|p| p != &peer_id);
                        self.on_peer_left(peer_id, &pending_peers, &mut cancelled).await;
                    }
                },

                Some((peer_id, result)) = pending.next(), if !pending.is_empty() => {
                    pending_peers.remove(&peer_id);
                    if known_in_flight.as_ref() == Some(&peer_id) {
                        known_in_flight = None;
                    }
                    self.on_consume_complete(peer_id, result, &mut cancelled).await;
                },

                else => {
                    // Every input is gone (handle dropped, signaling
                    // dead): tear down as if leave() had been called.
                    warn!("Session inputs closed, tearing down");
                    self.teardown().await;
                    return;
                }
            }
        }
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        debug!(?state, "Session state");
        let _ = self.state_tx.send(state);
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event).await;
    }

    fn should_skip(&self, peer_id: &PeerId, pending_peers: &HashSet<PeerId>) -> bool {
        *peer_id == self.local_peer
            || self.registry.contains_peer(peer_id)
            || pending_peers.contains(peer_id)
    }

    fn spawn_consume(
        &self,
        peer_id: PeerId,
        pending: &mut FuturesUnordered<BoxFuture<'static, ConsumeOutcome>>,
        pending_peers: &mut HashSet<PeerId>,
    ) {
        debug!(peer_id = %peer_id, "Consuming peer");
        pending_peers.insert(peer_id.clone());

        let transports = Arc::clone(&self.transports);
        pending.push(Box::pin(async move {
            let result = consume_and_resume(&transports, &peer_id).await;
            (peer_id, result)
        }));
    }

    fn on_new_producer(
        &self,
        peer_id: PeerId,
        pending: &mut FuturesUnordered<BoxFuture<'static, ConsumeOutcome>>,
        pending_peers: &mut HashSet<PeerId>,
    ) {
        // Duplicate announcements and the known-peer pass are both
        // idempotent writers: one consume per peer, ever, while it is
        // in the room.
        if self.should_skip(&peer_id, pending_peers) {
            debug!(peer_id = %peer_id, "Ignoring duplicate new-producer");
            return;
        }

        self.spawn_consume(peer_id, pending, pending_peers);
    }

    async fn on_peer_left(
        &mut self,
        peer_id: PeerId,
        pending_peers: &HashSet<PeerId>,
        cancelled: &mut HashSet<PeerId>,
    ) {
        info!(peer_id = %peer_id, "Peer left");

        if pending_peers.contains(&peer_id) {
            // Its consume is still in flight; discard the result when
            // it lands instead of registering a stale consumer.
            cancelled.insert(peer_id.clone());
        }

        let removed = self.registry.remove_all_by_peer(&peer_id);
        for consumer in &removed {
            self.emit(SessionEvent::ConsumerRemoved {
                consumer_id: consumer.id().clone(),
                peer_id: consumer.peer_id().clone(),
            })
            .await;
        }

        self.emit(SessionEvent::PeerLeft { peer_id }).await;
    }

    async fn on_consume_complete(
        &mut self,
        peer_id: PeerId,
        result: Result<Option<Consumer>>,
        cancelled: &mut HashSet<PeerId>,
    ) {
        if cancelled.remove(&peer_id) {
            if let Ok(Some(mut consumer)) = result {
                debug!(peer_id = %peer_id, "Peer left while consume in flight, discarding");
                consumer.close();
            }
            return;
        }

        match result {
            Ok(Some(consumer)) => {
                let consumer_id = consumer.id().clone();
                let stream = consumer.stream();

                if let Err(e) = self.registry.add(consumer) {
                    warn!(peer_id = %peer_id, "Dropping consumer: {}", e);
                    return;
                }

                self.emit(SessionEvent::ConsumerAdded {
                    consumer_id,
                    peer_id,
                    stream,
                })
                .await;
            }
            Ok(None) => {
                debug!(peer_id = %peer_id, "Consume declined, peer skipped");
            }
            Err(e) => {
                // Non-fatal: that peer is inaudible, the session goes on
                warn!(peer_id = %peer_id, "Consume failed, peer skipped: {}", e);
            }
        }
    }

    /// Teardown: every step is attempted even if an earlier one fails.
    async fn teardown(&mut self) {
        self.set_state(SessionState::Leaving);

        self.registry.drain_close();
        self.transports.close().await;
        self.channel.close();
        self.capture.release();

        self.set_state(SessionState::Closed);
        self.emit(SessionEvent::Left).await;
        info!("Session closed");
    }
}

/// One peer's consumption: negotiate, then activate. The consumer is
/// only handed back once the server acknowledged the resume.
async fn consume_and_resume(
    transports: &TransportPair,
    peer_id: &PeerId,
) -> Result<Option<Consumer>> {
    let Some(mut consumer) = transports.consume(peer_id).await? else {
        return Ok(None);
    };

    if let Err(e) = transports.resume(consumer.id()).await {
        consumer.close();
        return Err(e);
    }

    consumer.mark_resumed();
    Ok(Some(consumer))
}
