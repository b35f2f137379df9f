//! # notary-collab: two-party annotation sessions
//!
//! Shares annotation operations between a notary and a client over a room
//! and keeps each side's page state in step.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐                         ┌────────────────────┐
//! │ SessionCoordinator │                         │ SessionCoordinator │
//! │ (notary, authors)  │                         │ (client, views)    │
//! └─────────┬──────────┘                         └─────────▲──────────┘
//!           │ SyncChannel (JSON ops)                       │
//!           ▼                                              │
//! ┌────────────────────┐   RelayFrame (bincode)  ┌─────────┴──────────┐
//! │ Connector          │ ──────────────────────▶ │ Room               │
//! │ Memory / WebSocket │                         │ (broadcast fan-out)│
//! └────────────────────┘                         └────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: operation JSON codec and relay envelope
//! - [`channel`]: non-blocking send / validating receive with counters
//! - [`room`]: room membership and fan-out
//! - [`transport`]: `Connector` seam and the in-process hub
//! - [`server`] / [`client`]: WebSocket relay and its connector
//! - [`credentials`]: signed access tokens
//! - [`media`]: local device acquisition and release
//! - [`session`]: the per-participant state machine
//! - [`config`]: session and relay settings

pub mod channel;
pub mod client;
pub mod config;
pub mod credentials;
pub mod media;
pub mod protocol;
pub mod room;
pub mod server;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use channel::{ChannelStats, SendError, SyncChannel};
pub use client::WsConnector;
pub use config::{ConfigError, RelayConfig, SessionConfig};
pub use credentials::{
    AccessToken, ApiCredentials, CredentialError, CredentialIssuer, LocalTokenIssuer,
    DEFAULT_TOKEN_TTL,
};
pub use media::{DeviceKind, HeadlessMedia, MediaDevices, MediaError, MediaTrack};
pub use protocol::{
    decode_operation, encode_operation, JoinRejection, PeerInfo, ProtocolError, RelayFrame,
};
pub use room::{Admission, Room, RoomManager, RoomStats};
pub use server::{RelayServer, RelayStats};
pub use session::{SessionCoordinator, SessionError, SessionState};
pub use transport::{
    Connection, Connector, JoinRequest, MemoryConnector, TransportError, TransportEvent,
};
