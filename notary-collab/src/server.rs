//! WebSocket relay with room-based routing.
//!
//! Architecture:
//! ```text
//! Notary ──┐                         ┌──▶ Notary
//!          ├── Join(token) ── Room ──┤
//! Client ──┘    (verified)           └──▶ Client
//! ```
//!
//! Each connection first sends a `Join` frame. The token is verified with
//! the relay's [`CredentialIssuer`], the peer is admitted to its room and
//! answered with `Welcome` (or `Rejected`, after which the socket closes).
//! From then on `Data` frames are fanned out to the other members
//! unchanged; the relay never decodes annotation payloads.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::config::RelayConfig;
use crate::credentials::{CredentialIssuer, LocalTokenIssuer};
use crate::protocol::{JoinRejection, PeerInfo, RelayFrame};
use crate::room::{Admission, RoomManager};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;
type ConnResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Relay statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub frames_relayed: u64,
    pub rejected_joins: u64,
}

#[derive(Default)]
struct AtomicRelayStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    frames_relayed: AtomicU64,
    rejected_joins: AtomicU64,
}

impl AtomicRelayStats {
    fn snapshot(&self) -> RelayStats {
        RelayStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            rejected_joins: self.rejected_joins.load(Ordering::Relaxed),
        }
    }
}

/// Shared by every connection task.
struct RelayContext {
    config: RelayConfig,
    rooms: Arc<RoomManager>,
    issuer: Arc<dyn CredentialIssuer>,
    stats: AtomicRelayStats,
}

pub struct RelayServer {
    ctx: Arc<RelayContext>,
}

impl RelayServer {
    pub fn new(config: RelayConfig, issuer: Arc<dyn CredentialIssuer>) -> Self {
        let rooms = Arc::new(RoomManager::new(
            config.broadcast_capacity,
            config.max_peers_per_room,
        ));
        Self {
            ctx: Arc::new(RelayContext {
                config,
                rooms,
                issuer,
                stats: AtomicRelayStats::default(),
            }),
        }
    }

    /// Relay verifying tokens against the config's own credentials.
    pub fn from_config(config: RelayConfig) -> Self {
        let issuer = LocalTokenIssuer::new(config.credentials.clone()).with_ttl(config.token_ttl());
        if !issuer.is_configured() {
            log::warn!("Relay has no API credentials; every join will be rejected");
        }
        Self::new(config, Arc::new(issuer))
    }

    /// Bind the configured address and serve forever.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.ctx.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        log::info!("Relay listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                ctx.stats.total_connections.fetch_add(1, Ordering::Relaxed);
                ctx.stats.active_connections.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = handle_connection(stream, addr, &ctx).await {
                    log::error!("Connection error from {addr}: {e}");
                }
                ctx.stats.active_connections.fetch_sub(1, Ordering::Relaxed);
            });
        }
    }

    /// End `room` for everyone in it.
    pub async fn end_room(&self, room: &str, reason: &str) -> bool {
        self.ctx.rooms.end_room(room, reason).await
    }

    pub fn stats(&self) -> RelayStats {
        self.ctx.stats.snapshot()
    }

    pub fn bind_addr(&self) -> &str {
        &self.ctx.config.bind_addr
    }

    pub fn room_manager(&self) -> &Arc<RoomManager> {
        &self.ctx.rooms
    }
}

async fn send_frame(sink: &mut WsSink, frame: &RelayFrame) -> ConnResult<()> {
    sink.send(Message::Binary(frame.encode()?.into())).await?;
    Ok(())
}

/// Wait for the opening `Join` frame.
async fn read_join(source: &mut WsSource) -> ConnResult<Option<(String, String, PeerInfo)>> {
    while let Some(msg) = source.next().await {
        match msg? {
            Message::Binary(data) => {
                return Ok(match RelayFrame::decode(&data) {
                    Ok(RelayFrame::Join {
                        token,
                        room,
                        identity,
                        role,
                    }) => Some((token, room, PeerInfo::new(identity, role))),
                    _ => None,
                });
            }
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

async fn reject(sink: &mut WsSink, ctx: &RelayContext, rejection: JoinRejection) -> ConnResult<()> {
    ctx.stats.rejected_joins.fetch_add(1, Ordering::Relaxed);
    send_frame(sink, &RelayFrame::Rejected(rejection)).await?;
    sink.close().await?;
    Ok(())
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, ctx: &RelayContext) -> ConnResult<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    log::debug!("WebSocket connection established from {addr}");

    let join = match timeout(ctx.config.join_timeout(), read_join(&mut ws_receiver)).await {
        Ok(join) => join?,
        Err(_) => {
            log::warn!("No join request from {addr} within timeout");
            return Ok(());
        }
    };
    let Some((token, room_name, peer)) = join else {
        log::warn!("Malformed join request from {addr}");
        return reject(&mut ws_sender, ctx, JoinRejection::Malformed).await;
    };

    if let Err(e) = ctx.issuer.verify(&token, &peer.identity, &room_name) {
        log::warn!("Rejected {} from {addr}: {e}", peer.identity);
        return reject(&mut ws_sender, ctx, JoinRejection::InvalidToken(e.to_string())).await;
    }

    let Admission {
        room,
        mut frames,
        peers: present,
    } = match ctx.rooms.join(&room_name, peer.clone()).await {
        Ok(admission) => admission,
        Err(rejection) => {
            log::warn!("Rejected {} from {addr}: {rejection}", peer.identity);
            return reject(&mut ws_sender, ctx, rejection).await;
        }
    };
    let identity = peer.identity;

    let result = async {
        send_frame(&mut ws_sender, &RelayFrame::Welcome { peers: present }).await?;

        loop {
            tokio::select! {
                msg = ws_receiver.next() => match msg {
                    Some(Ok(Message::Binary(data))) => match RelayFrame::decode(&data) {
                        Ok(RelayFrame::Data { payload, .. }) => {
                            // the relay stamps the sender; clients cannot spoof it
                            room.publish(RelayFrame::Data { from: identity.clone(), payload });
                            ctx.stats.frames_relayed.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(RelayFrame::Ping) => send_frame(&mut ws_sender, &RelayFrame::Pong).await?,
                        Ok(other) => log::debug!("Ignoring {other:?} from {identity}"),
                        Err(e) => log::warn!("Failed to decode frame from {addr}: {e}"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("Connection closed from {addr}");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sender.send(Message::Pong(data)).await?;
                    }
                    Some(Err(e)) => {
                        log::error!("WebSocket error from {addr}: {e}");
                        break;
                    }
                    _ => {}
                },

                frame = frames.recv() => match frame {
                    Ok(frame) => {
                        if frame.origin() == Some(identity.as_str()) {
                            continue;
                        }
                        send_frame(&mut ws_sender, &frame).await?;
                        if let RelayFrame::Ended { .. } = *frame {
                            let _ = ws_sender.close().await;
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("Peer {identity} lagged by {n} frames");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        ConnResult::Ok(())
    }
    .await;

    room.leave(&identity).await;
    ctx.rooms.remove_if_empty(&room_name).await;
    result
}
