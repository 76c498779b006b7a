//! Rooms — the unit of broadcast fan-out.
//!
//! A room holds an ordered set of peers and is torn down the moment it
//! empties out; there is no persistence and no notion of a room surviving
//! its last participant.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::message::ParticipantInfo;
use crate::peer::PeerId;

/// A participant's standing within a room. Enforcement of "only one host"
/// and "who may grant ops" is deliberately left out here; see `DESIGN.md`
/// for how that ambiguity was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Ops,
    Guest,
}

#[derive(Clone)]
struct Participant {
    role: Role,
    joined_at: DateTime<Utc>,
}

/// A single room: an ordered-by-join-time set of peers, none of which
/// persist once the room is empty.
#[derive(Clone)]
pub struct Room {
    pub room_id: String,
    pub created_at: DateTime<Utc>,
    /// Insertion order is preserved by `HashMap` iteration only incidentally
    /// on small maps; callers that need deterministic order sort by
    /// `joined_at` (see [`Room::participants`]).
    participants: Arc<RwLock<HashMap<PeerId, Participant>>>,
}

impl Room {
    fn new(room_id: String) -> Self {
        Self {
            room_id,
            created_at: Utc::now(),
            participants: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn join(&self, peer_id: PeerId, role: Role) {
        self.participants.write().await.insert(
            peer_id,
            Participant { role, joined_at: Utc::now() },
        );
    }

    pub async fn leave(&self, peer_id: &PeerId) -> Option<Role> {
        self.participants
            .write()
            .await
            .remove(peer_id)
            .map(|p| p.role)
    }

    pub async fn role_of(&self, peer_id: &PeerId) -> Option<Role> {
        self.participants.read().await.get(peer_id).map(|p| p.role)
    }

    pub async fn is_empty(&self) -> bool {
        self.participants.read().await.is_empty()
    }

    pub async fn participant_count(&self) -> usize {
        self.participants.read().await.len()
    }

    /// All current members, in join order, for the `room-joined` snapshot.
    pub async fn participants(&self) -> Vec<ParticipantInfo> {
        let participants = self.participants.read().await;
        let mut entries: Vec<_> = participants
            .iter()
            .map(|(peer_id, p)| (peer_id.clone(), p.role, p.joined_at))
            .collect();
        entries.sort_by_key(|(_, _, joined_at)| *joined_at);
        entries
            .into_iter()
            .map(|(peer_id, role, _)| ParticipantInfo { peer_id: peer_id.into_string(), role })
            .collect()
    }

    /// Peer ids other than `exclude`, for broadcast fan-out.
    pub async fn other_members(&self, exclude: &PeerId) -> Vec<PeerId> {
        self.participants
            .read()
            .await
            .keys()
            .filter(|p| *p != exclude)
            .cloned()
            .collect()
    }
}

/// Tracks every live room, creating and tearing them down on demand.
#[derive(Clone, Default)]
pub struct RoomManager {
    rooms: Arc<RwLock<HashMap<String, Room>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room with a fresh id, or join an existing one by id.
    /// Returns the room and whether it was just created.
    pub async fn create_or_join(&self, room_id: Option<String>) -> (Room, bool) {
        let mut rooms = self.rooms.write().await;
        match room_id {
            Some(id) => {
                if let Some(room) = rooms.get(&id) {
                    (room.clone(), false)
                } else {
                    let room = Room::new(id.clone());
                    rooms.insert(id, room.clone());
                    (room, true)
                }
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                let room = Room::new(id.clone());
                rooms.insert(id, room.clone());
                (room, true)
            }
        }
    }

    pub async fn get(&self, room_id: &str) -> Option<Room> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Remove a room if it has no remaining participants. Called after every
    /// `leave` so empty rooms never linger.
    pub async fn remove_if_empty(&self, room_id: &str) {
        let room = self.rooms.read().await.get(room_id).cloned();
        if let Some(room) = room {
            if room.is_empty().await {
                self.rooms.write().await.remove(room_id);
                tracing::debug!(room_id, "room torn down, no participants left");
            }
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_or_join_with_no_id_makes_a_fresh_room() {
        let manager = RoomManager::new();
        let (room, created) = manager.create_or_join(None).await;
        assert!(created);
        assert_eq!(manager.room_count().await, 1);
        assert!(!room.room_id.is_empty());
    }

    #[tokio::test]
    async fn joining_same_id_twice_reuses_the_room() {
        let manager = RoomManager::new();
        let (first, created) = manager.create_or_join(Some("room-1".into())).await;
        assert!(created);
        let (second, created_again) = manager.create_or_join(Some("room-1".into())).await;
        assert!(!created_again);
        assert_eq!(first.room_id, second.room_id);
        assert_eq!(manager.room_count().await, 1);
    }

    #[tokio::test]
    async fn room_is_torn_down_once_empty() {
        let manager = RoomManager::new();
        let (room, _) = manager.create_or_join(Some("room-1".into())).await;
        let peer = PeerId::new("alice".into());
        room.join(peer.clone(), Role::Host).await;
        room.leave(&peer).await;
        manager.remove_if_empty("room-1").await;
        assert!(manager.get("room-1").await.is_none());
    }

    #[tokio::test]
    async fn participants_snapshot_is_join_ordered() {
        let room = Room::new("room-1".into());
        room.join(PeerId::new("a".into()), Role::Host).await;
        room.join(PeerId::new("b".into()), Role::Guest).await;
        let snapshot = room.participants().await;
        assert_eq!(snapshot[0].peer_id, "a");
        assert_eq!(snapshot[1].peer_id, "b");
    }
}
