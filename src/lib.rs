//! Client-side session orchestrator for JamBox audio conferencing
//!
//! This crate takes one local participant from "wants to join room R"
//! to "hears every other current and future participant, and is heard
//! by them" against a selective-forwarding-unit (SFU) media router.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  UI / capture / playback collaborators                   │
//! │  ↓ (CaptureSource, RemoteStream handles, leave())        │
//! │  Session (orchestrator state machine)                    │
//! │  ├─ SignalingChannel (JSON-RPC 2.0 over WebSocket)       │
//! │  ├─ EngineHandle (load-once media engine wrapper)        │
//! │  ├─ TransportPair (one Send + one Recv transport)        │
//! │  └─ ConsumerRegistry (per-consumer bookkeeping)          │
//! │     ↓                                                    │
//! │  SFU media router (remote)                               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Capture, playback rendering, and the media engine's transport
//! internals live outside this crate, behind the [`CaptureSource`],
//! [`RemoteStream`] and [`MediaEngine`] traits.
//!
//! # Example
//!
//! ```ignore
//! use jambox_client::{Session, SessionConfig, SessionEvent};
//!
//! let config = SessionConfig::new("ws://localhost:3001", "jam-42");
//! let (session, mut events) = Session::join(config, capture, engine).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::ConsumerAdded { stream, .. } = event {
//!         playback.render(stream);
//!     }
//! }
//!
//! session.leave().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod error;
pub mod types;

// Component modules
pub mod consumer;
pub mod engine;
pub mod media;
pub mod session;
pub mod signaling;
pub mod transport;

// Re-exports for public API
pub use config::SessionConfig;
pub use consumer::{Consumer, ConsumerInfo, ConsumerRegistry};
pub use engine::{EngineHandle, EngineTransport, MediaEngine, TransportNegotiator};
pub use error::{Error, Result};
pub use media::{AudioTrack, CaptureSource, LocalCapture, RemoteStream};
pub use session::{Session, SessionEvent, SessionState};
pub use signaling::{SignalingChannel, SignalingRequests};
pub use transport::TransportPair;

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
