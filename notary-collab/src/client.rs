//! WebSocket connector to a [`crate::server::RelayServer`].
//!
//! The join handshake runs inline (`Join` → `Welcome` | `Rejected`); after
//! it two tasks own the socket halves:
//! - writer: outbound payloads become `Data` frames, plus a `Ping` every
//!   heartbeat interval; closing the outbound channel closes the socket
//! - reader: relay frames become [`TransportEvent`]s, ending with exactly
//!   one `Disconnected`

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::SessionConfig;
use crate::protocol::{PeerInfo, RelayFrame};
use crate::transport::{
    frame_to_event, Connection, Connector, JoinRequest, TransportError, TransportEvent,
    DEFAULT_CHANNEL_CAPACITY,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    channel_capacity: usize,
    join_timeout: Duration,
    heartbeat: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            join_timeout: Duration::from_secs(10),
            heartbeat: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            url: config.relay_url.clone(),
            channel_capacity: config.channel_capacity,
            join_timeout: config.join_timeout(),
            heartbeat: config.heartbeat_interval(),
        }
    }

    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

async fn send_frame(sink: &mut WsSink, frame: &RelayFrame) -> Result<(), TransportError> {
    sink.send(Message::Binary(frame.encode()?.into()))
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))
}

async fn await_welcome(source: &mut WsSource) -> Result<Vec<PeerInfo>, TransportError> {
    while let Some(msg) = source.next().await {
        match msg.map_err(|e| TransportError::Connect(e.to_string()))? {
            Message::Binary(data) => match RelayFrame::decode(&data)? {
                RelayFrame::Welcome { peers } => return Ok(peers),
                RelayFrame::Rejected(rejection) => return Err(rejection.into()),
                other => log::debug!("Ignoring {other:?} before welcome"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(TransportError::ConnectionClosed)
}

impl Connector for WsConnector {
    async fn join(&self, request: JoinRequest) -> Result<Connection, TransportError> {
        log::info!("Connecting to relay at {}", self.url);
        let connect = tokio_tungstenite::connect_async(self.url.as_str());
        let (ws_stream, _) = timeout(self.join_timeout, connect)
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let local = request.local_peer();
        let join = RelayFrame::Join {
            token: request.token.value,
            room: request.room,
            identity: local.identity.clone(),
            role: local.role,
        };
        send_frame(&mut ws_writer, &join).await?;

        let peers = timeout(self.join_timeout, await_welcome(&mut ws_reader))
            .await
            .map_err(|_| TransportError::Timeout)??;
        log::info!("Joined as {} ({} peers present)", local.identity, peers.len());

        let (outbound_tx, outbound_rx) = mpsc::channel(self.channel_capacity);
        let (event_tx, event_rx) = mpsc::channel(self.channel_capacity);

        tokio::spawn(write_loop(
            ws_writer,
            outbound_rx,
            local.identity.clone(),
            self.heartbeat,
        ));
        tokio::spawn(read_loop(ws_reader, event_tx, local.identity.clone()));

        Ok(Connection {
            local,
            peers,
            outbound: outbound_tx,
            events: event_rx,
        })
    }
}

async fn write_loop(
    mut ws_writer: WsSink,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    identity: String,
    heartbeat: Duration,
) {
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    loop {
        let frame = tokio::select! {
            payload = outbound.recv() => match payload {
                Some(payload) => RelayFrame::Data { from: identity.clone(), payload },
                None => break,
            },
            _ = ticker.tick() => RelayFrame::Ping,
        };
        if let Err(e) = send_frame(&mut ws_writer, &frame).await {
            log::warn!("Relay send failed: {e}");
            return;
        }
    }
    log::debug!("Outbound channel closed, closing socket");
    let _ = ws_writer.send(Message::Close(None)).await;
    let _ = ws_writer.close().await;
}

async fn read_loop(mut ws_reader: WsSource, events: mpsc::Sender<TransportEvent>, identity: String) {
    let reason = loop {
        let Some(msg) = ws_reader.next().await else {
            break "connection closed".to_string();
        };
        match msg {
            Ok(Message::Binary(data)) => {
                let frame = match RelayFrame::decode(&data) {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!("Failed to decode relay frame: {e}");
                        continue;
                    }
                };
                if let RelayFrame::Ended { reason } = frame {
                    break reason;
                }
                if let Some(event) = frame_to_event(&frame, &identity) {
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            }
            Ok(Message::Close(_)) => break "relay closed the connection".to_string(),
            Ok(_) => {}
            Err(e) => break format!("connection error: {e}"),
        }
    };
    log::info!("Disconnected from relay: {reason}");
    let _ = events.send(TransportEvent::Disconnected { reason }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_core::Role;

    #[test]
    fn test_from_config() {
        let config = SessionConfig {
            relay_url: "ws://example.invalid:1234".into(),
            join_timeout_secs: 3,
            ..SessionConfig::new("client", Role::Client, "room")
        };
        let connector = WsConnector::from_config(&config);
        assert_eq!(connector.url(), "ws://example.invalid:1234");
        assert_eq!(connector.join_timeout, Duration::from_secs(3));
    }
}
