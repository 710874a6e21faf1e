//! Scripted in-process signaling server
//!
//! Accepts one WebSocket client, answers the session's JSON-RPC
//! requests from a configurable script, records every request in
//! arrival order, and lets tests push membership events and gate
//! individual `consume` replies to exercise in-flight races.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// One recorded request: method name plus its params
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub params: Value,
}

#[derive(Default)]
struct ServerScript {
    /// Peers reported as already present by `join`
    join_peers: Vec<String>,

    /// Methods the server rejects with an error reply
    rejected_methods: Vec<String>,

    /// Per-peer `consume` results overriding the default (use `{}` to decline)
    consume_replies: HashMap<String, Value>,

    /// Per-peer gates: the reply to `consume` waits on the receiver
    consume_gates: HashMap<String, oneshot::Receiver<()>>,
}

struct ServerState {
    script: Mutex<ServerScript>,
    log: Mutex<Vec<RecordedRequest>>,
    push_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    counter: AtomicU32,
}

/// Handle to the embedded signaling server
pub struct SignalServer {
    url: String,
    state: Arc<ServerState>,
}

impl SignalServer {
    /// Bind to a random local port and start accepting one client
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(ServerState {
            script: Mutex::new(ServerScript::default()),
            log: Mutex::new(Vec::new()),
            push_tx: Mutex::new(None),
            counter: AtomicU32::new(0),
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let ws = accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();

            // Writer: replies and pushed events share one ordered queue
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
            *accept_state.push_tx.lock().await = Some(out_tx.clone());

            tokio::spawn(async move {
                while let Some(text) = out_rx.recv().await {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Reader: handle each request on its own task so a gated
            // reply does not stall the connection
            while let Some(Ok(msg)) = source.next().await {
                let Message::Text(text) = msg else { continue };
                let state = accept_state.clone();
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    if let Some(reply) = state.handle_request(&text).await {
                        let _ = out_tx.send(reply);
                    }
                });
            }
        });

        Self {
            url: format!("ws://{}", addr),
            state,
        }
    }

    /// WebSocket URL of the server
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Peers the next `join` reply will report as present
    pub async fn set_join_peers(&self, peers: &[&str]) {
        self.state.script.lock().await.join_peers =
            peers.iter().map(|p| p.to_string()).collect();
    }

    /// Make the server reject a method with an error reply
    pub async fn reject_method(&self, method: &str) {
        self.state
            .script
            .lock()
            .await
            .rejected_methods
            .push(method.to_string());
    }

    /// Script the `consume` result for one peer (`{}` declines)
    pub async fn set_consume_reply(&self, peer: &str, reply: Value) {
        self.state
            .script
            .lock()
            .await
            .consume_replies
            .insert(peer.to_string(), reply);
    }

    /// Hold the `consume` reply for one peer until the returned sender
    /// fires
    pub async fn gate_consume(&self, peer: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state
            .script
            .lock()
            .await
            .consume_gates
            .insert(peer.to_string(), rx);
        tx
    }

    /// Push a `new-producer` event to the connected client
    pub async fn push_new_producer(&self, peer: &str) {
        self.push_event("new-producer", peer).await;
    }

    /// Push a `peer-left` event to the connected client
    pub async fn push_peer_left(&self, peer: &str) {
        self.push_event("peer-left", peer).await;
    }

    async fn push_event(&self, method: &str, peer: &str) {
        let text = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": {"peer_id": peer},
        })
        .to_string();

        // The connection may still be getting established
        for _ in 0..100 {
            if let Some(tx) = self.state.push_tx.lock().await.as_ref() {
                let _ = tx.send(text);
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        panic!("no client connected to push {} to", method);
    }

    /// Every request received so far, in arrival order
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.log.lock().await.clone()
    }

    /// Requests of one method, in arrival order
    pub async fn requests_for(&self, method: &str) -> Vec<RecordedRequest> {
        self.state
            .log
            .lock()
            .await
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    /// Poll until a predicate over the request log holds
    pub async fn wait_for_log(&self, predicate: impl Fn(&[RecordedRequest]) -> bool) {
        for _ in 0..500 {
            if predicate(&self.state.log.lock().await) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("request log never satisfied predicate");
    }
}

impl ServerState {
    async fn handle_request(&self, text: &str) -> Option<String> {
        let request: Value = serde_json::from_str(text).ok()?;
        let method = request["method"].as_str()?.to_string();
        let id = request["id"].clone();
        let params = request["params"].clone();

        self.log.lock().await.push(RecordedRequest {
            method: method.clone(),
            params: params.clone(),
        });

        if self
            .script
            .lock()
            .await
            .rejected_methods
            .contains(&method)
        {
            return Some(
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32000, "message": format!("{} rejected by script", method)},
                })
                .to_string(),
            );
        }

        let result = match method.as_str() {
            "join" => {
                let peers = self.script.lock().await.join_peers.clone();
                json!({"peer_id": "me", "peer_ids": peers})
            }
            "get-router-capabilities" => json!({"codecs": ["opus"]}),
            "create-transport" => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                json!({"id": format!("t-{}", n), "parameters": {}})
            }
            "connect-transport" => json!({"connected": true}),
            "produce" => json!({"producer_id": "prod-1"}),
            "consume" => {
                let peer = params["peer_id"].as_str().unwrap_or_default().to_string();

                let gate = self.script.lock().await.consume_gates.remove(&peer);
                if let Some(gate) = gate {
                    let _ = gate.await;
                }

                let scripted = self.script.lock().await.consume_replies.get(&peer).cloned();
                scripted.unwrap_or_else(|| {
                    let n = self.counter.fetch_add(1, Ordering::SeqCst);
                    json!({
                        "id": format!("c-{}", n),
                        "peer_id": peer,
                        "kind": "audio",
                        "rtp_parameters": {},
                    })
                })
            }
            "resume" => json!({"resumed": true}),
            _ => {
                return Some(
                    json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32601, "message": format!("unknown method {}", method)},
                    })
                    .to_string(),
                );
            }
        };

        Some(
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result,
            })
            .to_string(),
        )
    }
}
