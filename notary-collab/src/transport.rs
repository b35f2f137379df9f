//! Session transport: joining a room and exchanging opaque payloads.
//!
//! A [`Connector`] turns a [`JoinRequest`] into a [`Connection`]: an
//! outbound byte sender plus a stream of [`TransportEvent`]s. The session
//! coordinator only sees this surface; whether frames cross a process
//! boundary ([`crate::client::WsConnector`]) or stay in memory
//! ([`MemoryConnector`]) is invisible to it.
//!
//! Dropping the outbound sender leaves the room.

use std::future::Future;
use std::sync::Arc;

use notary_core::Role;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::credentials::{AccessToken, CredentialError, CredentialIssuer};
use crate::protocol::{JoinRejection, PeerInfo, ProtocolError, RelayFrame};
use crate::room::{Admission, FrameReceiver, Room, RoomManager};

/// Default buffer for outbound payloads and inbound events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("join rejected: {0}")]
    InvalidToken(String),
    #[error("identity '{0}' is already connected to this room")]
    DuplicateIdentity(String),
    #[error("room '{0}' is full")]
    RoomFull(String),
    #[error("relay refused the join request")]
    Refused,
    #[error("timed out waiting for the relay")]
    Timeout,
    #[error("connection closed during join")]
    ConnectionClosed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<JoinRejection> for TransportError {
    fn from(rejection: JoinRejection) -> Self {
        match rejection {
            JoinRejection::InvalidToken(reason) => TransportError::InvalidToken(reason),
            JoinRejection::DuplicateIdentity(identity) => {
                TransportError::DuplicateIdentity(identity)
            }
            JoinRejection::RoomFull(room) => TransportError::RoomFull(room),
            JoinRejection::Malformed => TransportError::Refused,
        }
    }
}

impl From<CredentialError> for TransportError {
    fn from(err: CredentialError) -> Self {
        TransportError::InvalidToken(err.to_string())
    }
}

impl TransportError {
    /// Status text shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Connect(_) | TransportError::Timeout => {
                "Could not reach the session server, please try again".to_string()
            }
            TransportError::DuplicateIdentity(_) => {
                "You are already connected from another window".to_string()
            }
            TransportError::RoomFull(_) => "This session already has two participants".to_string(),
            other => format!("Failed to join the session: {other}"),
        }
    }
}

/// What the coordinator receives from the room.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message { from: String, payload: Vec<u8> },
    PeerJoined(PeerInfo),
    PeerLeft(String),
    Disconnected { reason: String },
}

#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub token: AccessToken,
    pub room: String,
    pub identity: String,
    pub role: Role,
}

impl JoinRequest {
    pub fn local_peer(&self) -> PeerInfo {
        PeerInfo::new(self.identity.clone(), self.role)
    }
}

/// A joined room.
#[derive(Debug)]
pub struct Connection {
    pub local: PeerInfo,
    /// Peers already present when the join completed.
    pub peers: Vec<PeerInfo>,
    pub outbound: mpsc::Sender<Vec<u8>>,
    pub events: mpsc::Receiver<TransportEvent>,
}

pub trait Connector {
    fn join(
        &self,
        request: JoinRequest,
    ) -> impl Future<Output = Result<Connection, TransportError>> + Send;
}

/// Translate a room frame into a coordinator event for `local`.
///
/// Frames caused by `local` itself and relay housekeeping yield `None`.
pub(crate) fn frame_to_event(frame: &RelayFrame, local: &str) -> Option<TransportEvent> {
    if frame.origin() == Some(local) {
        return None;
    }
    match frame {
        RelayFrame::Data { from, payload } => Some(TransportEvent::Message {
            from: from.clone(),
            payload: payload.clone(),
        }),
        RelayFrame::PeerJoined(info) => Some(TransportEvent::PeerJoined(info.clone())),
        RelayFrame::PeerLeft { identity } => Some(TransportEvent::PeerLeft(identity.clone())),
        RelayFrame::Ended { reason } => Some(TransportEvent::Disconnected {
            reason: reason.clone(),
        }),
        _ => None,
    }
}

/// In-process transport over a shared [`RoomManager`].
#[derive(Clone)]
pub struct MemoryConnector {
    rooms: Arc<RoomManager>,
    issuer: Arc<dyn CredentialIssuer>,
    channel_capacity: usize,
}

impl MemoryConnector {
    pub fn new(rooms: Arc<RoomManager>, issuer: Arc<dyn CredentialIssuer>) -> Self {
        Self {
            rooms,
            issuer,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }
}

impl Connector for MemoryConnector {
    async fn join(&self, request: JoinRequest) -> Result<Connection, TransportError> {
        self.issuer
            .verify(&request.token.value, &request.identity, &request.room)?;

        let local = request.local_peer();
        let Admission {
            room,
            frames,
            peers,
        } = self.rooms.join(&request.room, local.clone()).await?;

        let (outbound_tx, outbound_rx) = mpsc::channel(self.channel_capacity);
        let (event_tx, event_rx) = mpsc::channel(self.channel_capacity);

        tokio::spawn(pump_outbound(
            outbound_rx,
            room,
            self.rooms.clone(),
            local.identity.clone(),
        ));
        tokio::spawn(pump_inbound(frames, event_tx, local.identity.clone()));

        Ok(Connection {
            local,
            peers,
            outbound: outbound_tx,
            events: event_rx,
        })
    }
}

async fn pump_outbound(
    mut outbound: mpsc::Receiver<Vec<u8>>,
    room: Arc<Room>,
    rooms: Arc<RoomManager>,
    identity: String,
) {
    while let Some(payload) = outbound.recv().await {
        log::trace!("{identity} -> room {}: {} bytes", room.name(), payload.len());
        room.publish(RelayFrame::Data {
            from: identity.clone(),
            payload,
        });
    }
    room.leave(&identity).await;
    rooms.remove_if_empty(room.name()).await;
}

async fn pump_inbound(
    mut frames: FrameReceiver,
    events: mpsc::Sender<TransportEvent>,
    identity: String,
) {
    loop {
        tokio::select! {
            _ = events.closed() => break,
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    let Some(event) = frame_to_event(&frame, &identity) else {
                        continue;
                    };
                    let ended = matches!(event, TransportEvent::Disconnected { .. });
                    if events.send(event).await.is_err() || ended {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("{identity} lagged by {n} frames");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    let _ = events
                        .send(TransportEvent::Disconnected {
                            reason: "room closed".to_string(),
                        })
                        .await;
                    break;
                }
            },
        }
    }
}
