//! In-process room transport.
//!
//! Each room owns one tokio broadcast channel; every participant holds an
//! independent receiver that buffers up to `capacity` messages. Senders
//! receive their own messages too; filtering is the caller's job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{Participant, ProtocolError, RoomId, WireMessage};

/// Default per-receiver buffer.
pub const DEFAULT_ROOM_CAPACITY: usize = 256;

/// Statistics for monitoring room health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomStats {
    pub messages_sent: u64,
    /// Messages published while nobody was subscribed.
    pub messages_dropped: u64,
    pub active_participants: usize,
}

struct AtomicRoomStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicRoomStats {
    fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    fn record(&self, receivers: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        if receivers == 0 {
            self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Broadcast group for one room. Participants are kept in join order.
pub struct RoomChannel {
    sender: broadcast::Sender<Arc<Vec<u8>>>,
    participants: RwLock<Vec<Participant>>,
    capacity: usize,
    stats: AtomicRoomStats,
}

impl RoomChannel {
    /// Create a room whose channel buffers `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            participants: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
            stats: AtomicRoomStats::new(),
        }
    }

    /// Register a participant and hand back its receiver.
    ///
    /// Re-adding a known id replaces its entry in place.
    pub async fn add_participant(&self, info: Participant) -> broadcast::Receiver<Arc<Vec<u8>>> {
        let mut participants = self.participants.write().await;
        match participants.iter_mut().find(|p| p.id == info.id) {
            Some(existing) => *existing = info,
            None => participants.push(info),
        }
        self.sender.subscribe()
    }

    /// Remove a participant. Returns the removed entry, if any.
    pub async fn remove_participant(&self, id: &Uuid) -> Option<Participant> {
        let mut participants = self.participants.write().await;
        let index = participants.iter().position(|p| p.id == *id)?;
        Some(participants.remove(index))
    }

    /// Encode and publish. Returns how many receivers got the message.
    pub fn broadcast(&self, msg: &WireMessage) -> Result<usize, ProtocolError> {
        let encoded = msg.encode()?;
        Ok(self.broadcast_raw(Arc::new(encoded)))
    }

    /// Publish pre-encoded bytes.
    pub fn broadcast_raw(&self, encoded: Arc<Vec<u8>>) -> usize {
        let count = self.sender.send(encoded).unwrap_or(0);
        self.stats.record(count);
        count
    }

    /// Number of participants on the roster.
    pub async fn participant_count(&self) -> usize {
        self.participants.read().await.len()
    }

    /// Roster snapshot in join order.
    pub async fn participants(&self) -> Vec<Participant> {
        self.participants.read().await.clone()
    }

    /// Whether `id` is on the roster.
    pub async fn has_participant(&self, id: &Uuid) -> bool {
        self.participants.read().await.iter().any(|p| p.id == *id)
    }

    /// Traffic counters and current roster size.
    pub async fn stats(&self) -> RoomStats {
        RoomStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            active_participants: self.participants.read().await.len(),
        }
    }

    /// Channel buffer size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw receiver without roster registration.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Vec<u8>>> {
        self.sender.subscribe()
    }
}

/// Hub tuning.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Messages buffered per receiver before it starts lagging
    pub room_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            room_capacity: DEFAULT_ROOM_CAPACITY,
        }
    }
}

impl HubConfig {
    /// Small buffers for tests.
    pub fn for_testing() -> Self {
        Self { room_capacity: 16 }
    }
}

/// Maps room ids to their broadcast groups. Rooms are isolated from each
/// other and created on first use.
pub struct RoomHub {
    rooms: RwLock<HashMap<RoomId, Arc<RoomChannel>>>,
    config: HubConfig,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl RoomHub {
    /// Create an empty hub.
    pub fn new(config: HubConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Configuration new rooms are created with.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Get a room, creating it on first use.
    pub async fn get_or_create(&self, room_id: &RoomId) -> Arc<RoomChannel> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring write lock
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }

        log::debug!("Opening room {room_id}");
        let room = Arc::new(RoomChannel::new(self.config.room_capacity));
        rooms.insert(room_id.clone(), room.clone());
        room
    }

    /// Get an existing room.
    pub async fn get(&self, room_id: &RoomId) -> Option<Arc<RoomChannel>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Drop the room once its roster is empty.
    pub async fn remove_if_empty(&self, room_id: &RoomId) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            if room.participant_count().await == 0 {
                rooms.remove(room_id);
                log::debug!("Closed empty room {room_id}");
                return true;
            }
        }
        false
    }

    /// Number of open rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Ids of all open rooms.
    pub async fn active_rooms(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CodePayload;
    use playground_core::LanguageId;

    fn room_id(raw: &str) -> RoomId {
        RoomId::parse(raw).unwrap()
    }

    fn update(origin: Uuid) -> WireMessage {
        WireMessage::code_update(
            origin,
            room_id("r1"),
            1,
            &CodePayload {
                source: "print(1)".into(),
                language: LanguageId::Python,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_room_add_remove() {
        let room = RoomChannel::new(16);
        let alice = Participant::new("Alice");
        let id = alice.id;

        let _rx = room.add_participant(alice).await;
        assert_eq!(room.participant_count().await, 1);
        assert!(room.has_participant(&id).await);

        assert!(room.remove_participant(&id).await.is_some());
        assert_eq!(room.participant_count().await, 0);
        assert!(room.remove_participant(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_fan_out_includes_sender() {
        let room = RoomChannel::new(16);
        let alice = Participant::new("Alice");
        let bob = Participant::new("Bob");

        let mut rx1 = room.add_participant(alice.clone()).await;
        let mut rx2 = room.add_participant(bob).await;

        let count = room.broadcast(&update(alice.id)).unwrap();
        assert_eq!(count, 2);

        let bytes = rx1.recv().await.unwrap();
        assert_eq!(WireMessage::decode(&bytes).unwrap().origin, alice.id);
        let _ = rx2.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_roster_keeps_join_order() {
        let room = RoomChannel::new(16);
        let names = ["Alice", "Bob", "Carol"];
        let mut receivers = Vec::new();
        for name in names {
            receivers.push(room.add_participant(Participant::new(name)).await);
        }

        let roster: Vec<String> = room.participants().await.into_iter().map(|p| p.name).collect();
        assert_eq!(roster, names);
    }

    #[tokio::test]
    async fn test_readd_replaces_entry() {
        let room = RoomChannel::new(16);
        let id = Uuid::new_v4();
        let _a = room.add_participant(Participant::with_id(id, "Old")).await;
        let _b = room.add_participant(Participant::with_id(id, "New")).await;

        let roster = room.participants().await;
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "New");
    }

    #[tokio::test]
    async fn test_stats_count_dropped() {
        let room = RoomChannel::new(16);
        room.broadcast_raw(Arc::new(vec![1]));

        let alice = Participant::new("Alice");
        let _rx = room.add_participant(alice.clone()).await;
        room.broadcast(&update(alice.id)).unwrap();

        let stats = room.stats().await;
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.messages_dropped, 1);
        assert_eq!(stats.active_participants, 1);
    }

    #[tokio::test]
    async fn test_hub_get_or_create() {
        let hub = RoomHub::new(HubConfig::for_testing());
        let a = hub.get_or_create(&room_id("abc")).await;
        let b = hub.get_or_create(&room_id("abc")).await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.capacity(), 16);
        assert_eq!(hub.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_hub_rooms_isolated() {
        let hub = RoomHub::default();
        let one = hub.get_or_create(&room_id("one")).await;
        let two = hub.get_or_create(&room_id("two")).await;

        let mut rx_two = two.add_participant(Participant::new("Bob")).await;
        let _rx_one = one.add_participant(Participant::new("Alice")).await;
        one.broadcast(&update(Uuid::new_v4())).unwrap();

        assert!(rx_two.try_recv().is_err());
        let rooms = hub.active_rooms().await;
        assert!(rooms.contains(&room_id("one")));
        assert!(rooms.contains(&room_id("two")));
    }

    #[tokio::test]
    async fn test_hub_cleanup() {
        let hub = RoomHub::default();
        let id = room_id("abc");
        let room = hub.get_or_create(&id).await;
        let alice = Participant::new("Alice");
        let _rx = room.add_participant(alice.clone()).await;

        assert!(!hub.remove_if_empty(&id).await);
        room.remove_participant(&alice.id).await;
        assert!(hub.remove_if_empty(&id).await);
        assert_eq!(hub.room_count().await, 0);
        assert!(hub.get(&id).await.is_none());
    }
}
