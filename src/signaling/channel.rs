//! WebSocket signaling channel with request correlation
//!
//! One persistent connection to the signaling server, wrapped as a typed
//! request/response-with-correlation layer plus an ordered event queue.
//! Retry policy belongs to callers; this layer resolves every request
//! exactly once: with the server's reply, a rejection, or a timeout.

use super::protocol::{ClientRequest, ServerEvent, ServerMessage};
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Result<serde_json::Value>>>>>;

/// Request surface of the signaling channel.
///
/// The transport layer depends on this seam rather than on the concrete
/// WebSocket channel.
#[async_trait::async_trait]
pub trait SignalingRequests: Send + Sync {
    /// Issue one request and await its reply
    async fn request(&self, method: &str, params: serde_json::Value)
        -> Result<serde_json::Value>;
}

#[async_trait::async_trait]
impl SignalingRequests for SignalingChannel {
    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        SignalingChannel::request(self, method, params).await
    }
}

/// Typed signaling channel over one WebSocket connection
pub struct SignalingChannel {
    /// Outgoing message sender
    tx: mpsc::UnboundedSender<Message>,

    /// In-flight requests awaiting their reply, keyed by correlation id
    pending: PendingMap,

    /// Whether the underlying connection is still up
    connected: Arc<AtomicBool>,

    /// Per-request reply timeout
    request_timeout: Duration,
}

impl SignalingChannel {
    /// Connect to the signaling server.
    ///
    /// Returns the channel plus the receiver on which server-pushed
    /// events arrive, in arrival order, never coalesced.
    ///
    /// # Arguments
    ///
    /// * `url` - WebSocket signaling server URL (ws:// or wss://)
    /// * `request_timeout` - per-request reply deadline
    pub async fn connect(
        url: &str,
        request_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>)> {
        info!("Connecting to signaling server: {}", url);

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocket(format!("Failed to connect: {}", e)))?;

        info!("Connected to signaling server");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(Self::receiver_task(
            read,
            pending.clone(),
            event_tx,
            connected.clone(),
        ));

        Ok((
            Self {
                tx,
                pending,
                connected,
                request_timeout,
            },
            event_rx,
        ))
    }

    /// Sender task: sends messages from channel to WebSocket
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));

            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }

            if is_close {
                break;
            }
        }

        debug!("Signaling sender task terminated");
    }

    /// Receiver task: correlates replies and forwards events
    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        pending: PendingMap,
        event_tx: mpsc::UnboundedSender<ServerEvent>,
        connected: Arc<AtomicBool>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    if let Err(e) = Self::handle_message(&text, &pending, &event_tx).await {
                        warn!("Failed to handle signaling message: {}", e);
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Signaling connection closed by server");
                    break;
                }
                Err(e) => {
                    error!("Signaling connection error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        connected.store(false, Ordering::SeqCst);

        // Fail everything still waiting for a reply
        let mut pending = pending.lock().await;
        for (id, sender) in pending.drain() {
            debug!("Failing in-flight request {} on disconnect", id);
            let _ = sender.send(Err(Error::Signaling(
                "connection closed while request in flight".to_string(),
            )));
        }

        debug!("Signaling receiver task terminated");
    }

    /// Handle one incoming wire message
    async fn handle_message(
        text: &str,
        pending: &PendingMap,
        event_tx: &mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<()> {
        let msg = ServerMessage::from_json(text)?;

        if let Some(id) = &msg.id {
            let sender = pending.lock().await.remove(id);

            let Some(sender) = sender else {
                warn!("Reply for unknown or timed-out request: {}", id);
                return Ok(());
            };

            let outcome = if let Some(err) = msg.error {
                Err(Error::ServerRejected(err.message))
            } else {
                Ok(msg.result.unwrap_or(serde_json::Value::Null))
            };

            let _ = sender.send(outcome);
            return Ok(());
        }

        if let (Some(method), Some(params)) = (&msg.method, &msg.params) {
            if let Some(event) = ServerEvent::from_notification(method, params)? {
                if event_tx.send(event).is_err() {
                    debug!("Event receiver dropped, discarding {}", method);
                }
            } else {
                warn!("Unknown signaling event: {}", method);
            }
            return Ok(());
        }

        Err(Error::InvalidData(format!(
            "Message is neither reply nor event: {}",
            text
        )))
    }

    /// Issue one request and await its reply.
    ///
    /// Resolves exactly once: with the server's result, with
    /// [`Error::ServerRejected`] on an error reply, with
    /// [`Error::RequestTimeout`] after the configured deadline, or with
    /// [`Error::Signaling`] if the connection is (or goes) down. Never
    /// panics into the caller.
    pub async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if !self.is_connected() {
            return Err(Error::Signaling(format!(
                "cannot send {}: not connected",
                method
            )));
        }

        let request = ClientRequest::new(method, params);
        let id = request.id.clone();
        let json = request.to_json()?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), reply_tx);

        debug!("Sending signaling request: {} ({})", method, id);

        if self.tx.send(Message::Text(json)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::Signaling(format!(
                "cannot send {}: connection closed",
                method
            )));
        }

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::Signaling(format!(
                "connection closed while {} in flight",
                method
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::RequestTimeout(method.to_string()))
            }
        }
    }

    /// Whether the underlying connection is still up
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Close the connection. Safe to call more than once.
    pub fn close(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Closing signaling connection");
        let _ = self.tx.send(Message::Close(None));
    }
}
