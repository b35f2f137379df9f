//! Session coordinator: one participant's view of the shared document.
//!
//! ```text
//!            start()                 join ok
//! Disconnected ─────▶ Connecting ──────────────▶ Connected { peer_present }
//!      ▲                  │ credentials / join        │
//!      │                  │ failure                   │ leave() or
//!      └──────────────────┴───────────────────────────┘ transport Disconnected
//! ```
//!
//! The coordinator is driven from a single task through `&mut self`.
//! Transport callbacks arrive as [`TransportEvent`]s and are applied one at
//! a time by [`SessionCoordinator::handle_event`]; nothing here locks.
//!
//! Local edits and remote operations take the same path: canvas, journal,
//! then a redraw if the operation lands on the page being viewed. Only the
//! notary may author; concurrent operations from both sides are applied in
//! arrival order with no further merging.

use std::fmt;
use std::sync::Arc;

use notary_core::{
    CanvasState, Color, Operation, OperationError, OperationLog, Origin, Participant, Point, Role,
    Roster,
};
use notary_render::{open_document, DocumentSource, Frame, PageRenderer, RenderError};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::channel::{ChannelStats, SyncChannel};
use crate::config::{ConfigError, SessionConfig};
use crate::credentials::{CredentialError, CredentialIssuer};
use crate::media::{DeviceKind, HeadlessMedia, MediaDevices, MediaTrack};
use crate::transport::{Connection, Connector, JoinRequest, TransportError, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected { peer_present: bool },
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected { peer_present: true } => write!(f, "connected"),
            SessionState::Connected { peer_present: false } => write!(f, "connected (alone)"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    InvalidOperation(#[from] OperationError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("the {0} cannot annotate the document")]
    ReadOnly(Role),
    #[error("not connected to a session")]
    NotConnected,
    #[error("session already started")]
    AlreadyActive,
}

impl SessionError {
    /// Status text shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Credentials(e) => e.user_message(),
            SessionError::Transport(e) => e.user_message(),
            SessionError::ReadOnly(_) => "Viewing document (read-only)".to_string(),
            SessionError::NotConnected => "Join the session before annotating".to_string(),
            other => other.to_string(),
        }
    }
}

struct Link {
    channel: SyncChannel,
    events: mpsc::Receiver<TransportEvent>,
}

pub struct SessionCoordinator<C> {
    config: SessionConfig,
    connector: C,
    issuer: Arc<dyn CredentialIssuer>,
    media: Box<dyn MediaDevices>,
    document: Box<dyn DocumentSource>,
    renderer: PageRenderer,

    state: SessionState,
    roster: Roster,
    canvas: CanvasState,
    journal: OperationLog,
    current_page: u32,
    frame: Option<Frame>,
    link: Option<Link>,
    last_stats: ChannelStats,
    tracks: Vec<MediaTrack>,
    status: String,
    notices: Vec<String>,
}

impl<C: Connector> SessionCoordinator<C> {
    /// Build a disconnected session.
    ///
    /// The configured document is opened now (placeholder on failure);
    /// media defaults to [`HeadlessMedia`].
    pub fn new(
        config: SessionConfig,
        connector: C,
        issuer: Arc<dyn CredentialIssuer>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let renderer = PageRenderer::new(config.render_config())?;
        let document = open_document(config.document.as_deref());
        let roster = Roster::new(config.identity.clone(), config.role);
        Ok(Self {
            config,
            connector,
            issuer,
            media: Box::new(HeadlessMedia),
            document,
            renderer,
            state: SessionState::Disconnected,
            roster,
            canvas: CanvasState::new(),
            journal: OperationLog::new(),
            current_page: 1,
            frame: None,
            link: None,
            last_stats: ChannelStats::default(),
            tracks: Vec::new(),
            status: "Not connected".to_string(),
            notices: Vec::new(),
        })
    }

    pub fn with_media(mut self, media: impl MediaDevices + 'static) -> Self {
        self.media = Box::new(media);
        self
    }

    pub fn with_document(mut self, document: impl DocumentSource + 'static) -> Self {
        self.document = Box::new(document);
        self.current_page = 1;
        self.frame = None;
        self
    }

    // -----------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------

    /// Fetch credentials, acquire media and join the room.
    ///
    /// Page state and journal start blank on every call.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(SessionError::AlreadyActive);
        }
        self.state = SessionState::Connecting;
        self.status = "Connecting...".to_string();
        self.notices.clear();
        self.canvas.reset();
        self.journal.clear();
        self.frame = None;
        self.roster = Roster::new(self.config.identity.clone(), self.config.role);
        log::info!(
            "Starting session for {} ({}) in room {}",
            self.config.identity,
            self.config.role,
            self.config.room
        );

        let token = match self.issuer.issue(&self.config.identity, &self.config.room) {
            Ok(token) => token,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.acquire_media();

        let request = JoinRequest {
            token,
            room: self.config.room.clone(),
            identity: self.config.identity.clone(),
            role: self.config.role,
        };
        match self.connector.join(request).await {
            Ok(connection) => {
                self.on_joined(connection);
                Ok(())
            }
            Err(e) => {
                self.tracks.clear();
                Err(self.fail(e.into()))
            }
        }
    }

    /// Leave the room and release local media.
    pub fn leave(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.teardown("left the session");
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        log::error!("Session start failed: {err}");
        self.state = SessionState::Disconnected;
        self.roster.set_local_connected(false);
        self.status = err.user_message();
        err
    }

    fn acquire_media(&mut self) {
        for kind in DeviceKind::ALL {
            match self.media.acquire(kind) {
                Ok(track) => {
                    log::info!("Acquired {kind} '{}'", track.label());
                    self.tracks.push(track);
                }
                Err(e) => {
                    log::warn!("Media unavailable: {e}");
                    self.notices.push(e.user_message());
                }
            }
        }
    }

    fn on_joined(&mut self, connection: Connection) {
        let Connection {
            local,
            peers,
            outbound,
            events,
        } = connection;

        for peer in peers.into_iter().filter(|p| p.identity != local.identity) {
            if peer.role == local.role {
                log::warn!("{} joined with the same role ({})", peer.identity, peer.role);
            }
            self.roster.remote_joined(peer.identity);
        }
        self.roster.set_local_connected(true);
        self.link = Some(Link {
            channel: SyncChannel::new(outbound),
            events,
        });
        self.state = SessionState::Connected {
            peer_present: self.roster.remote_present(),
        };
        log::info!("Connected to room {} as {}", self.config.room, local.identity);

        self.refresh_status();
        self.redraw();
    }

    fn teardown(&mut self, reason: &str) {
        if let Some(link) = self.link.take() {
            self.last_stats = link.channel.stats();
        }
        let released = self.tracks.len();
        self.tracks.clear();
        self.roster.set_local_connected(false);
        self.roster.reset_remote();
        self.state = SessionState::Disconnected;
        self.status = format!("Disconnected: {reason}");
        log::info!("Session ended: {reason} ({released} media tracks released)");
    }

    fn set_peer_present(&mut self, present: bool) {
        if let SessionState::Connected { .. } = self.state {
            self.state = SessionState::Connected {
                peer_present: present,
            };
        }
        self.refresh_status();
    }

    fn refresh_status(&mut self) {
        self.status = match self.state {
            SessionState::Disconnected => "Not connected".to_string(),
            SessionState::Connecting => "Connecting...".to_string(),
            SessionState::Connected { peer_present: true } => {
                format!("Connected with {}", self.roster.remote().identity)
            }
            SessionState::Connected {
                peer_present: false,
            } => format!("Waiting for the {} to join", self.config.role.counterpart()),
        };
    }

    // -----------------------------------------------------------
    // Authoring
    // -----------------------------------------------------------

    /// Apply a locally authored operation and send it to the peer.
    pub fn author(&mut self, op: Operation) -> Result<(), SessionError> {
        let role = self.config.role;
        if !role.can_author() {
            return Err(SessionError::ReadOnly(role));
        }
        let SessionState::Connected { peer_present } = self.state else {
            return Err(SessionError::NotConnected);
        };
        op.validate()?;

        self.apply(Origin::Local, op.clone());
        if peer_present {
            if let Some(link) = self.link.as_mut() {
                // failures are counted and logged by the channel; the op stays local
                let _ = link.channel.send(&op);
            }
        } else {
            log::debug!("No peer present, {} kept local", op.kind());
        }
        Ok(())
    }

    pub fn draw(
        &mut self,
        page: u32,
        path: impl IntoIterator<Item = Point>,
        color: Color,
        stroke_width: f32,
    ) -> Result<(), SessionError> {
        self.author(Operation::draw(page, path, color, stroke_width))
    }

    pub fn add_text(
        &mut self,
        page: u32,
        x: f32,
        y: f32,
        value: impl Into<String>,
        font_size: f32,
        color: Color,
    ) -> Result<(), SessionError> {
        self.author(Operation::text(page, x, y, value, font_size, color))
    }

    pub fn clear_page(&mut self, page: u32) -> Result<(), SessionError> {
        self.author(Operation::clear(page))
    }

    fn apply(&mut self, origin: Origin, op: Operation) {
        let page = op.page();
        self.canvas.apply(op.clone());
        self.journal.record(origin, op);
        if page == self.current_page {
            self.redraw();
        }
    }

    // -----------------------------------------------------------
    // Events
    // -----------------------------------------------------------

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message { from, payload } => {
                let Some(link) = self.link.as_mut() else {
                    return;
                };
                if let Some(op) = link.channel.receive(&from, &payload) {
                    self.apply(Origin::Remote(from), op);
                }
            }
            TransportEvent::PeerJoined(peer) => {
                log::info!("{} ({}) joined the session", peer.identity, peer.role);
                self.roster.remote_joined(peer.identity);
                self.set_peer_present(true);
            }
            TransportEvent::PeerLeft(identity) => {
                if self.roster.remote_left(&identity) {
                    log::info!("{identity} left the session");
                    self.set_peer_present(false);
                }
            }
            TransportEvent::Disconnected { reason } => {
                if self.state != SessionState::Disconnected {
                    self.teardown(&reason);
                }
            }
        }
    }

    /// Wait for the next transport event. `None` once disconnected.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        let link = self.link.as_mut()?;
        Some(
            link.events
                .recv()
                .await
                .unwrap_or_else(|| TransportEvent::Disconnected {
                    reason: "transport closed".to_string(),
                }),
        )
    }

    /// Handle every event already queued, without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(link) = self.link.as_mut() {
            let event = match link.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => TransportEvent::Disconnected {
                    reason: "transport closed".to_string(),
                },
            };
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Handle events until the session disconnects.
    pub async fn run_until_disconnected(&mut self) {
        while let Some(event) = self.next_event().await {
            self.handle_event(event);
        }
    }

    // -----------------------------------------------------------
    // Viewing
    // -----------------------------------------------------------

    /// Switch to `page`, clamped to the document. Returns the page shown.
    pub fn set_page(&mut self, page: u32) -> Result<u32, SessionError> {
        self.current_page = page.clamp(1, self.document.page_count().max(1));
        self.render_current()?;
        Ok(self.current_page)
    }

    /// Render the current page with its live operations.
    pub fn render_current(&mut self) -> Result<&Frame, SessionError> {
        let page = self.current_page;
        self.canvas.ensure_page(page);
        let frame = self
            .renderer
            .render(self.document.as_ref(), page, self.canvas.page(page))?;
        Ok(self.frame.insert(frame))
    }

    fn redraw(&mut self) {
        if let Err(e) = self.render_current() {
            log::error!("Failed to render page {}: {e}", self.current_page);
        }
    }

    // -----------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Per-device media notices from the last `start()`.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn participants(&self) -> [&Participant; 2] {
        self.roster.participants()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn canvas(&self) -> &CanvasState {
        &self.canvas
    }

    pub fn journal(&self) -> &OperationLog {
        &self.journal
    }

    /// Counters for the current link, or the last one after disconnect.
    pub fn channel_stats(&self) -> ChannelStats {
        self.link
            .as_ref()
            .map_or(self.last_stats, |link| link.channel.stats())
    }

    /// Last rendered frame of the current page.
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn page_count(&self) -> u32 {
        self.document.page_count()
    }

    pub fn document_name(&self) -> &str {
        self.document.name()
    }

    pub fn media_tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Whether this participant may author operations.
    pub fn can_author(&self) -> bool {
        self.config.role.can_author()
    }
}
