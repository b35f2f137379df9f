//! Rooms: membership plus fan-out of relay frames.
//!
//! Every member of a room holds a receiver on the room's tokio broadcast
//! channel, so one send reaches all members. Frames carry their origin and
//! each member skips its own.
//!
//! ```text
//!   member A ──publish──▶ ┌────────────────────────────┐ ──▶ rx A (skips own)
//!                         │ broadcast::Sender<Arc<..>> │
//!   member B ──publish──▶ └────────────────────────────┘ ──▶ rx B
//! ```
//!
//! Receivers that fall more than `capacity` frames behind lose the oldest
//! frames (`RecvError::Lagged`) rather than blocking the sender.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::protocol::{JoinRejection, PeerInfo, RelayFrame};

/// Default members per room: one notary and one client.
pub const DEFAULT_MAX_PEERS: usize = 2;

/// Default frames buffered per member.
pub const DEFAULT_CAPACITY: usize = 256;

pub type FrameReceiver = broadcast::Receiver<Arc<RelayFrame>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomStats {
    pub frames_published: u64,
    pub joins_rejected: u64,
    pub active_peers: usize,
}

#[derive(Default)]
struct AtomicRoomStats {
    frames_published: AtomicU64,
    joins_rejected: AtomicU64,
}

pub struct Room {
    name: String,
    sender: broadcast::Sender<Arc<RelayFrame>>,
    peers: RwLock<HashMap<String, PeerInfo>>,
    max_peers: usize,
    stats: AtomicRoomStats,
}

impl Room {
    pub fn new(name: impl Into<String>, capacity: usize, max_peers: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            sender,
            peers: RwLock::new(HashMap::new()),
            max_peers,
            stats: AtomicRoomStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admit `info` as a member.
    ///
    /// Returns the member's frame receiver and the peers that were already
    /// present. Everyone else is told with a `PeerJoined` frame.
    pub async fn admit(
        &self,
        info: PeerInfo,
    ) -> Result<(FrameReceiver, Vec<PeerInfo>), JoinRejection> {
        let mut peers = self.peers.write().await;
        if peers.contains_key(&info.identity) {
            self.stats.joins_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(JoinRejection::DuplicateIdentity(info.identity));
        }
        if peers.len() >= self.max_peers {
            self.stats.joins_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(JoinRejection::RoomFull(self.name.clone()));
        }

        // subscribe before announcing so nothing published after admission is missed
        let receiver = self.sender.subscribe();
        let present: Vec<PeerInfo> = peers.values().cloned().collect();
        peers.insert(info.identity.clone(), info.clone());
        drop(peers);

        log::info!(
            "{} ({}) joined room {} ({} present)",
            info.identity,
            info.role,
            self.name,
            present.len()
        );
        self.publish(RelayFrame::PeerJoined(info));
        Ok((receiver, present))
    }

    /// Remove a member and announce `PeerLeft`.
    pub async fn leave(&self, identity: &str) -> Option<PeerInfo> {
        let removed = self.peers.write().await.remove(identity);
        if removed.is_some() {
            log::info!("{identity} left room {}", self.name);
            self.publish(RelayFrame::PeerLeft {
                identity: identity.to_string(),
            });
        }
        removed
    }

    /// Fan `frame` out to every member. Returns the receiver count.
    pub fn publish(&self, frame: RelayFrame) -> usize {
        self.publish_shared(Arc::new(frame))
    }

    pub fn publish_shared(&self, frame: Arc<RelayFrame>) -> usize {
        let count = self.sender.send(frame).unwrap_or(0);
        self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Tell every member the room is over.
    pub fn end(&self, reason: &str) -> usize {
        log::info!("Ending room {}: {reason}", self.name);
        self.publish(RelayFrame::Ended {
            reason: reason.to_string(),
        })
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn has_peer(&self, identity: &str) -> bool {
        self.peers.read().await.contains_key(identity)
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    pub async fn stats(&self) -> RoomStats {
        RoomStats {
            frames_published: self.stats.frames_published.load(Ordering::Relaxed),
            joins_rejected: self.stats.joins_rejected.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }
}

/// A successful [`RoomManager::join`].
pub struct Admission {
    pub room: Arc<Room>,
    pub frames: FrameReceiver,
    /// Members present before this one.
    pub peers: Vec<PeerInfo>,
}

/// Maps room names to rooms.
pub struct RoomManager {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    capacity: usize,
    max_peers: usize,
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_MAX_PEERS)
    }
}

impl RoomManager {
    pub fn new(capacity: usize, max_peers: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            capacity,
            max_peers,
        }
    }

    pub async fn get_or_create(&self, name: &str) -> Arc<Room> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(name) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        // another task may have created it between the locks
        if let Some(room) = rooms.get(name) {
            return room.clone();
        }

        log::debug!("Creating room {name}");
        let room = Arc::new(Room::new(name, self.capacity, self.max_peers));
        rooms.insert(name.to_string(), room.clone());
        room
    }

    /// Admit `info` to room `name`, creating the room if needed.
    ///
    /// Lookup and admission happen under the manager's write lock, so a
    /// concurrent [`remove_if_empty`](Self::remove_if_empty) never drops the
    /// room between the two. A rejected join leaves no empty room behind.
    pub async fn join(&self, name: &str, info: PeerInfo) -> Result<Admission, JoinRejection> {
        let mut rooms = self.rooms.write().await;
        let room = match rooms.get(name) {
            Some(room) => room.clone(),
            None => {
                log::debug!("Creating room {name}");
                let room = Arc::new(Room::new(name, self.capacity, self.max_peers));
                rooms.insert(name.to_string(), room.clone());
                room
            }
        };

        match room.admit(info).await {
            Ok((frames, peers)) => Ok(Admission { room, frames, peers }),
            Err(rejection) => {
                if room.peer_count().await == 0 {
                    rooms.remove(name);
                }
                Err(rejection)
            }
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(name).cloned()
    }

    pub async fn remove_if_empty(&self, name: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(name) {
            if room.peer_count().await == 0 {
                rooms.remove(name);
                log::debug!("Removed empty room {name}");
                return true;
            }
        }
        false
    }

    /// Broadcast `Ended` to the room's members and forget it.
    ///
    /// Returns false if no such room exists.
    pub async fn end_room(&self, name: &str, reason: &str) -> bool {
        let Some(room) = self.rooms.write().await.remove(name) else {
            return false;
        };
        room.end(reason);
        true
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_rooms(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}
