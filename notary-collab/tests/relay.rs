//! Integration tests against a real WebSocket relay.
//!
//! These start a relay on a local port and connect sessions through
//! `WsConnector`, exercising the full frame pipeline.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use notary_collab::{
    ApiCredentials, CredentialIssuer, JoinRejection, LocalTokenIssuer, RelayConfig, RelayFrame,
    RelayServer, SessionConfig, SessionCoordinator, SessionError, SessionState, TransportError,
    WsConnector,
};
use notary_core::{Color, Point, Role};
use notary_render::BlankDocument;
use tokio::net::TcpListener;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

fn credentials() -> ApiCredentials {
    ApiCredentials::new("relay-key", "relay-secret")
}

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a relay on an ephemeral port; returns it and its URL.
async fn start_relay() -> (Arc<RelayServer>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let config = RelayConfig {
        credentials: Some(credentials()),
        ..RelayConfig::default()
    };
    let server = Arc::new(RelayServer::from_config(config));
    let running = server.clone();
    tokio::spawn(async move {
        running.serve(listener).await.unwrap();
    });
    (server, url)
}

fn session(
    url: &str,
    identity: &str,
    role: Role,
    creds: ApiCredentials,
) -> SessionCoordinator<WsConnector> {
    let config = SessionConfig {
        relay_url: url.to_string(),
        join_timeout_secs: 2,
        ..SessionConfig::new(identity, role, "closing-9")
    };
    let issuer: Arc<dyn CredentialIssuer> = Arc::new(LocalTokenIssuer::new(Some(creds)));
    SessionCoordinator::new(config.clone(), WsConnector::from_config(&config), issuer)
        .unwrap()
        .with_document(BlankDocument::new(1, 64.0, 64.0))
}

async fn pump_until(
    session: &mut SessionCoordinator<WsConnector>,
    mut done: impl FnMut(&SessionCoordinator<WsConnector>) -> bool,
) {
    timeout(Duration::from_secs(10), async {
        while !done(session) {
            match session.next_event().await {
                Some(event) => session.handle_event(event),
                None => break,
            }
        }
    })
    .await
    .expect("timed out waiting for session events");
    assert!(done(session), "session disconnected before condition held");
}

#[tokio::test]
async fn test_relay_run_accepts_connections() {
    let port = free_port().await;
    let config = RelayConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        credentials: Some(credentials()),
        ..RelayConfig::default()
    };
    let server = RelayServer::from_config(config);
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    // Give the relay time to bind
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}")).await;
    assert!(result.is_ok(), "Should connect to relay");
}

#[tokio::test]
async fn test_annotation_crosses_relay() {
    let (server, url) = start_relay().await;
    let mut notary = session(&url, "notary", Role::Notary, credentials());
    let mut client = session(&url, "client", Role::Client, credentials());

    notary.start().await.unwrap();
    client.start().await.unwrap();
    assert_eq!(client.state(), SessionState::Connected { peer_present: true });
    pump_until(&mut notary, |s| {
        s.state() == SessionState::Connected { peer_present: true }
    })
    .await;

    notary
        .draw(
            1,
            [Point::new(10.0, 10.0), Point::new(20.0, 20.0)],
            Color::RED,
            3.0,
        )
        .unwrap();
    pump_until(&mut client, |s| s.canvas().page(1).len() == 1).await;

    assert_eq!(client.canvas().page(1), notary.canvas().page(1));
    let frame = client.frame().unwrap();
    assert_eq!(frame.pixel(15, 15), Some([255, 0, 0, 255]));

    assert!(server.stats().frames_relayed >= 1);
    assert_eq!(server.stats().rejected_joins, 0);
}

#[tokio::test]
async fn test_peer_leave_over_relay() {
    let (_server, url) = start_relay().await;
    let mut notary = session(&url, "notary", Role::Notary, credentials());
    let mut client = session(&url, "client", Role::Client, credentials());
    notary.start().await.unwrap();
    client.start().await.unwrap();
    pump_until(&mut notary, |s| {
        s.state() == SessionState::Connected { peer_present: true }
    })
    .await;

    client.leave();
    pump_until(&mut notary, |s| {
        s.state() == SessionState::Connected { peer_present: false }
    })
    .await;
}

#[tokio::test]
async fn test_wrong_secret_rejected() {
    let (server, url) = start_relay().await;
    let mut intruder = session(
        &url,
        "notary",
        Role::Notary,
        ApiCredentials::new("relay-key", "guessed"),
    );

    let err = intruder.start().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::InvalidToken(_))
    ));
    assert_eq!(intruder.state(), SessionState::Disconnected);
    assert_eq!(server.stats().rejected_joins, 1);
}

#[tokio::test]
async fn test_room_full_over_relay() {
    let (_server, url) = start_relay().await;
    let mut notary = session(&url, "notary", Role::Notary, credentials());
    let mut client = session(&url, "client", Role::Client, credentials());
    notary.start().await.unwrap();
    client.start().await.unwrap();

    let mut third = session(&url, "observer", Role::Client, credentials());
    let err = third.start().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::RoomFull(_))
    ));
}

#[tokio::test]
async fn test_end_room_over_relay() {
    let (server, url) = start_relay().await;
    let mut notary = session(&url, "notary", Role::Notary, credentials());
    let mut client = session(&url, "client", Role::Client, credentials());
    notary.start().await.unwrap();
    client.start().await.unwrap();

    assert!(server.end_room("closing-9", "notarization complete").await);

    pump_until(&mut client, |s| s.state() == SessionState::Disconnected).await;
    assert_eq!(client.status(), "Disconnected: notarization complete");
    pump_until(&mut notary, |s| s.state() == SessionState::Disconnected).await;
}

#[tokio::test]
async fn test_malformed_join_rejected() {
    let (server, url) = start_relay().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    ws.send(Message::Binary(vec![0xde, 0xad].into()))
        .await
        .unwrap();

    let reply = timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("no reply")
        .expect("stream ended")
        .unwrap();
    let Message::Binary(data) = reply else {
        panic!("expected binary frame, got {reply:?}");
    };
    assert_eq!(
        RelayFrame::decode(&data).unwrap(),
        RelayFrame::Rejected(JoinRejection::Malformed)
    );
    assert_eq!(server.stats().rejected_joins, 1);
}

#[tokio::test]
async fn test_unreachable_relay() {
    let port = free_port().await;
    let mut notary = session(
        &format!("ws://127.0.0.1:{port}"),
        "notary",
        Role::Notary,
        credentials(),
    );
    let err = notary.start().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::Connect(_) | TransportError::Timeout)
    ));
    assert_eq!(
        notary.status(),
        "Could not reach the session server, please try again"
    );
}
