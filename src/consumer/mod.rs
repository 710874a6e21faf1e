//! Consumer bookkeeping
//!
//! One [`Consumer`] per currently-forwarded remote track, stored keyed
//! by the server-issued [`ConsumerId`], never by [`PeerId`], which can
//! collide across rapid rejoin churn. PeerId is a secondary lookup
//! field used for bulk removal when a peer departs.

use crate::media::RemoteStream;
use crate::types::{ConsumerId, PeerId, PlaybackState};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A remote participant's inbound media unit
pub struct Consumer {
    /// Server-issued identifier, globally unique
    id: ConsumerId,

    /// Peer whose track this consumer carries
    peer_id: PeerId,

    /// Opaque stream handle for the playback surface
    stream: Arc<dyn RemoteStream>,

    /// Forwarding state; starts Paused, flips after the resume ack
    playback: PlaybackState,

    /// Whether the underlying stream has been closed
    closed: bool,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.id)
            .field("peer_id", &self.peer_id)
            .field("playback", &self.playback)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Consumer {
    /// Wrap a freshly negotiated consumer. Always starts Paused.
    pub fn new(id: ConsumerId, peer_id: PeerId, stream: Arc<dyn RemoteStream>) -> Self {
        Self {
            id,
            peer_id,
            stream,
            playback: PlaybackState::Paused,
            closed: false,
        }
    }

    /// Server-issued consumer id
    pub fn id(&self) -> &ConsumerId {
        &self.id
    }

    /// Owning peer
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// The stream handle for the playback surface
    pub fn stream(&self) -> Arc<dyn RemoteStream> {
        Arc::clone(&self.stream)
    }

    /// Current playback state
    pub fn playback(&self) -> PlaybackState {
        self.playback
    }

    /// Mark the consumer resumed after the server acknowledged
    pub fn mark_resumed(&mut self) {
        self.playback = PlaybackState::Resumed;
    }

    /// Close the underlying stream. Only the first call reaches it.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;
        debug!(consumer_id = %self.id, peer_id = %self.peer_id, "Closing consumer");
        self.stream.close();
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if !self.closed {
            warn!(consumer_id = %self.id, "Consumer dropped without close");
            self.close();
        }
    }
}

/// Snapshot of a consumer for rendering
#[derive(Debug, Clone)]
pub struct ConsumerInfo {
    /// Server-issued consumer id
    pub consumer_id: ConsumerId,

    /// Owning peer
    pub peer_id: PeerId,

    /// Current playback state
    pub playback: PlaybackState,
}

/// Registry of live consumers, keyed by server-issued [`ConsumerId`].
///
/// Mutated only from the session orchestrator's event-handling paths, so
/// no internal locking is needed.
#[derive(Default)]
pub struct ConsumerRegistry {
    consumers: HashMap<ConsumerId, Consumer>,

    /// Insertion order, for stable rendering snapshots
    order: Vec<ConsumerId>,
}

impl ConsumerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a consumer.
    ///
    /// # Errors
    ///
    /// A duplicate [`ConsumerId`] is a protocol violation and is
    /// rejected; the incoming consumer is closed before returning.
    pub fn add(&mut self, mut consumer: Consumer) -> Result<()> {
        if self.consumers.contains_key(consumer.id()) {
            consumer.close();
            return Err(Error::Session(format!(
                "duplicate consumer id: {}",
                consumer.id()
            )));
        }

        debug!(consumer_id = %consumer.id(), peer_id = %consumer.peer_id(), "Registering consumer");
        self.order.push(consumer.id().clone());
        self.consumers.insert(consumer.id().clone(), consumer);
        Ok(())
    }

    /// Mark a consumer resumed. No-op if it was removed in the meantime.
    pub fn mark_resumed(&mut self, id: &ConsumerId) {
        if let Some(consumer) = self.consumers.get_mut(id) {
            consumer.mark_resumed();
        }
    }

    /// Remove and close one consumer by its id
    pub fn remove_by_consumer_id(&mut self, id: &ConsumerId) -> Option<Consumer> {
        let mut consumer = self.consumers.remove(id)?;
        self.order.retain(|o| o != id);
        consumer.close();
        Some(consumer)
    }

    /// Remove and close every consumer owned by the given peer.
    ///
    /// Each matched consumer's stream is closed before it leaves the
    /// map, so no engine resource outlives its registry entry. A second
    /// call for the same peer is a no-op returning an empty list.
    pub fn remove_all_by_peer(&mut self, peer_id: &PeerId) -> Vec<Consumer> {
        let ids: Vec<ConsumerId> = self
            .order
            .iter()
            .filter(|id| {
                self.consumers
                    .get(id)
                    .is_some_and(|c| c.peer_id() == peer_id)
            })
            .cloned()
            .collect();

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(mut consumer) = self.consumers.remove(&id) {
                self.order.retain(|o| o != &id);
                consumer.close();
                removed.push(consumer);
            }
        }

        removed
    }

    /// Whether any live consumer is owned by the given peer
    pub fn contains_peer(&self, peer_id: &PeerId) -> bool {
        self.consumers.values().any(|c| c.peer_id() == peer_id)
    }

    /// Current consumers in insertion order, for rendering
    pub fn snapshot(&self) -> Vec<ConsumerInfo> {
        self.order
            .iter()
            .filter_map(|id| self.consumers.get(id))
            .map(|c| ConsumerInfo {
                consumer_id: c.id().clone(),
                peer_id: c.peer_id().clone(),
                playback: c.playback(),
            })
            .collect()
    }

    /// Number of live consumers
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Close and drop every consumer (teardown)
    pub fn drain_close(&mut self) {
        for (_, mut consumer) in self.consumers.drain() {
            consumer.close();
        }
        self.order.clear();
    }
}
