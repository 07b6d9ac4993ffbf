//! Session membership: which room we are in and who else is there.
//!
//! State machine: `Disconnected` ⇄ `Connected`. All session fields live
//! behind one `RwLock` and move together on join/leave, so observers never
//! see a room id without its roster or a stale revision after leaving.
//!
//! The roster is seeded from the room on join and then maintained by a
//! presence task reacting to `PeerJoined`/`PeerLeft` messages.

use std::sync::Arc;

use playground_core::{LanguageId, User};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broadcast::RoomHub;
use crate::protocol::{MessageType, Participant, ProtocolError, RoomId, WireMessage};

pub(crate) type Inbound = broadcast::Receiver<Arc<Vec<u8>>>;

/// Display name used when no signed-in user is available.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Last remote edit applied locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub source: String,
    pub language_id: LanguageId,
}

/// Membership errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Room id must be 1-64 characters of letters, digits, '-' or '_' (got {0:?})")]
    InvalidRoomId(String),
    #[error(transparent)]
    Protocol(ProtocolError),
}

impl From<ProtocolError> for SessionError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::InvalidRoomId(raw) => Self::InvalidRoomId(raw),
            other => Self::Protocol(other),
        }
    }
}

/// Identifies one membership period. Rejoining the same room yields a new
/// link, so work tied to an old membership can detect it is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomLink {
    pub room_id: RoomId,
    epoch: u64,
}

impl RoomLink {
    /// Membership counter; bumped on every join.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[derive(Default)]
struct Session {
    room_id: Option<RoomId>,
    participants: Vec<Participant>,
    last_applied_revision: Option<Revision>,
    epoch: u64,
    /// Code-update receiver waiting for the propagation channel.
    inbound: Option<Inbound>,
    presence_task: Option<JoinHandle<()>>,
}

impl Session {
    fn link(&self) -> Option<RoomLink> {
        self.room_id.as_ref().map(|room_id| RoomLink {
            room_id: room_id.clone(),
            epoch: self.epoch,
        })
    }

    fn is_current(&self, link: &RoomLink) -> bool {
        self.epoch == link.epoch && self.room_id.as_ref() == Some(&link.room_id)
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            room_id: self.room_id.clone(),
            participants: self.participants.clone(),
            last_applied_revision: self.last_applied_revision.clone(),
        }
    }

    /// Back to the initial state. The epoch survives so links stay unique.
    fn reset(&mut self) {
        if let Some(task) = self.presence_task.take() {
            task.abort();
        }
        self.room_id = None;
        self.participants.clear();
        self.last_applied_revision = None;
        self.inbound = None;
    }
}

/// Read-only view used by status indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub room_id: Option<RoomId>,
    pub participants: Vec<Participant>,
    pub last_applied_revision: Option<Revision>,
}

impl SessionSnapshot {
    /// Whether the snapshot was taken inside a room.
    pub fn is_connected(&self) -> bool {
        self.room_id.is_some()
    }

    /// Connection state derived from the room id.
    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Number of participants on the roster.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// `Room: <id> · N participant(s)`, or `None` while disconnected.
    pub fn status_line(&self) -> Option<String> {
        let room_id = self.room_id.as_ref()?;
        let count = self.participants.len();
        let noun = if count == 1 { "participant" } else { "participants" };
        Some(format!("Room: {room_id} · {count} {noun}"))
    }
}

/// Narrow handle given to the propagation channel: it may read the current
/// room and record applied revisions, nothing else.
#[derive(Clone)]
pub struct RevisionSink {
    state: Arc<RwLock<Session>>,
}

impl RevisionSink {
    /// Current membership, if connected.
    pub async fn room_link(&self) -> Option<RoomLink> {
        self.state.read().await.link()
    }

    /// Current room, if connected.
    pub async fn room_id(&self) -> Option<RoomId> {
        self.state.read().await.room_id.clone()
    }

    /// Whether `link` is still the active membership.
    pub async fn is_current(&self, link: &RoomLink) -> bool {
        self.state.read().await.is_current(link)
    }

    /// Claim the code-update receiver opened for `link`. Yields it once.
    pub(crate) async fn take_inbound(&self, link: &RoomLink) -> Option<Inbound> {
        let mut session = self.state.write().await;
        if !session.is_current(link) {
            return None;
        }
        session.inbound.take()
    }

    /// Store `revision` unless the membership it belongs to has ended.
    pub async fn record(&self, link: &RoomLink, revision: Revision) -> bool {
        let mut session = self.state.write().await;
        if !session.is_current(link) {
            return false;
        }
        session.last_applied_revision = Some(revision);
        true
    }

    /// Most recently accepted remote revision.
    pub async fn last_applied_revision(&self) -> Option<Revision> {
        self.state.read().await.last_applied_revision.clone()
    }
}

/// Owns the session and serializes every membership change.
pub struct SessionManager {
    local: Participant,
    hub: Arc<RoomHub>,
    state: Arc<RwLock<Session>>,
}

impl SessionManager {
    /// Disconnected manager for `local` on `hub`.
    pub fn new(local: Participant, hub: Arc<RoomHub>) -> Self {
        Self {
            local,
            hub,
            state: Arc::new(RwLock::new(Session::default())),
        }
    }

    /// Local participant named after the signed-in user, or `Anonymous`.
    pub fn for_user(user: Option<&User>, hub: Arc<RoomHub>) -> Self {
        let name = user.map_or(ANONYMOUS_NAME, User::participant_name);
        Self::new(Participant::new(name), hub)
    }

    /// The participant this manager joins rooms as.
    pub fn local_participant(&self) -> &Participant {
        &self.local
    }

    /// Hub rooms are looked up in.
    pub fn hub(&self) -> &Arc<RoomHub> {
        &self.hub
    }

    /// Handle for the propagation channel.
    pub fn revision_sink(&self) -> RevisionSink {
        RevisionSink {
            state: self.state.clone(),
        }
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.snapshot().await.state()
    }

    /// Whether the manager is inside a room.
    pub async fn is_connected(&self) -> bool {
        self.state.read().await.room_id.is_some()
    }

    /// Current room, if connected.
    pub async fn room_id(&self) -> Option<RoomId> {
        self.state.read().await.room_id.clone()
    }

    /// Copy of the session for display.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.read().await.snapshot()
    }

    /// Join `raw_room_id`, leaving the current room first if connected.
    pub async fn join(&self, raw_room_id: &str) -> Result<SessionSnapshot, SessionError> {
        let room_id = RoomId::parse(raw_room_id)?;
        let mut session = self.state.write().await;
        if session.room_id.is_some() {
            self.leave_locked(&mut session).await;
        }

        let room = self.hub.get_or_create(&room_id).await;
        // Both receivers exist before anything is announced, so neither
        // presence nor code traffic after this point can be missed.
        let presence_rx = room.add_participant(self.local.clone()).await;
        let code_rx = room.subscribe();
        let roster = room.participants().await;

        session.epoch += 1;
        session.room_id = Some(room_id.clone());
        session.participants = roster;
        session.last_applied_revision = None;
        session.inbound = Some(code_rx);

        let link = RoomLink {
            room_id: room_id.clone(),
            epoch: session.epoch,
        };
        session.presence_task = Some(tokio::spawn(track_presence(
            self.state.clone(),
            link,
            self.local.id,
            presence_rx,
        )));

        if let Err(e) = WireMessage::peer_joined(room_id.clone(), &self.local)
            .and_then(|msg| room.broadcast(&msg))
        {
            log::warn!("Failed to announce join of {room_id}: {e}");
        }

        log::info!(
            "{} joined room {room_id} ({} participants)",
            self.local.name,
            session.participants.len()
        );
        Ok(session.snapshot())
    }

    /// Generate a fresh room id and join it.
    pub async fn create_room(&self) -> Result<RoomId, SessionError> {
        let room_id = RoomId::generate();
        self.join(room_id.as_str()).await?;
        Ok(room_id)
    }

    /// Leave the current room. Returns whether a room was left.
    pub async fn leave(&self) -> bool {
        let mut session = self.state.write().await;
        if session.room_id.is_none() {
            return false;
        }
        self.leave_locked(&mut session).await;
        true
    }

    async fn leave_locked(&self, session: &mut Session) {
        let Some(room_id) = session.room_id.clone() else {
            return;
        };
        session.reset();
        depart(&self.hub, &self.local, &room_id).await;
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(session) = self.state.try_read() {
            if session.room_id.is_none() {
                return;
            }
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            if let Ok(mut session) = self.state.try_write() {
                if let Some(room_id) = session.room_id.clone() {
                    log::warn!(
                        "{} dropped outside a runtime; room {room_id} keeps its entry",
                        self.local.name
                    );
                }
                session.reset();
            }
            return;
        };

        let state = self.state.clone();
        let hub = self.hub.clone();
        let local = self.local.clone();
        handle.spawn(async move {
            let mut session = state.write().await;
            if let Some(room_id) = session.room_id.clone() {
                session.reset();
                depart(&hub, &local, &room_id).await;
            }
        });
    }
}

/// Take `local` out of `room_id`, announce it, and drop the room once empty.
async fn depart(hub: &RoomHub, local: &Participant, room_id: &RoomId) {
    if let Some(room) = hub.get(room_id).await {
        room.remove_participant(&local.id).await;
        if let Err(e) = room.broadcast(&WireMessage::peer_left(room_id.clone(), local.id)) {
            log::warn!("Failed to announce leave of {room_id}: {e}");
        }
        hub.remove_if_empty(room_id).await;
    }
    log::info!("{} left room {room_id}", local.name);
}

/// Keep the roster in step with presence announcements for one membership.
async fn track_presence(
    state: Arc<RwLock<Session>>,
    link: RoomLink,
    local_id: Uuid,
    mut rx: Inbound,
) {
    loop {
        let bytes = match rx.recv().await {
            Ok(bytes) => bytes,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("Presence for {} lagged by {skipped} messages", link.room_id);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let msg = match WireMessage::decode(&bytes) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Dropping undecodable room message: {e}");
                continue;
            }
        };
        if msg.msg_type == MessageType::CodeUpdate
            || msg.origin == local_id
            || msg.room_id != link.room_id
        {
            continue;
        }

        let mut session = state.write().await;
        if !session.is_current(&link) {
            break;
        }
        match msg.msg_type {
            MessageType::PeerJoined => match msg.participant() {
                Ok(info) => {
                    if !session.participants.iter().any(|p| p.id == info.id) {
                        log::debug!("{} joined {}", info.name, link.room_id);
                        session.participants.push(info);
                    }
                }
                Err(e) => log::warn!("Malformed join announcement: {e}"),
            },
            MessageType::PeerLeft => {
                session.participants.retain(|p| p.id != msg.origin);
            }
            MessageType::CodeUpdate => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::HubConfig;
    use std::time::Duration;

    fn hub() -> Arc<RoomHub> {
        Arc::new(RoomHub::new(HubConfig::for_testing()))
    }

    async fn wait_for_count(manager: &SessionManager, expected: usize) -> SessionSnapshot {
        for _ in 0..100 {
            let snapshot = manager.snapshot().await;
            if snapshot.participant_count() == expected {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("roster never reached {expected} participants");
    }

    #[tokio::test]
    async fn test_initial_state() {
        let manager = SessionManager::new(Participant::new("Alice"), hub());
        let snapshot = manager.snapshot().await;

        assert_eq!(snapshot.state(), ConnectionState::Disconnected);
        assert!(snapshot.room_id.is_none());
        assert!(snapshot.participants.is_empty());
        assert!(snapshot.last_applied_revision.is_none());
        assert_eq!(snapshot.status_line(), None);
    }

    #[tokio::test]
    async fn test_join_appends_local_participant() {
        let manager = SessionManager::new(Participant::new("Alice"), hub());
        let snapshot = manager.join("  abc123 ").await.unwrap();

        assert_eq!(snapshot.room_id.as_ref().unwrap().as_str(), "abc123");
        assert_eq!(snapshot.participants, vec![manager.local_participant().clone()]);
        assert_eq!(manager.state().await, ConnectionState::Connected);
        assert_eq!(
            snapshot.status_line().as_deref(),
            Some("Room: abc123 · 1 participant")
        );
    }

    #[tokio::test]
    async fn test_blank_room_id_rejected() {
        let manager = SessionManager::new(Participant::new("Alice"), hub());
        assert!(matches!(
            manager.join("   ").await,
            Err(SessionError::InvalidRoomId(_))
        ));
        assert!(matches!(
            manager.join("no spaces").await,
            Err(SessionError::InvalidRoomId(_))
        ));
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_leave_restores_initial_state() {
        let hub = hub();
        let manager = SessionManager::new(Participant::new("Alice"), hub.clone());
        manager.join("abc").await.unwrap();

        assert!(manager.leave().await);
        let snapshot = manager.snapshot().await;
        assert!(!snapshot.is_connected());
        assert!(snapshot.participants.is_empty());
        assert!(snapshot.last_applied_revision.is_none());
        assert_eq!(hub.room_count().await, 0);

        assert!(!manager.leave().await);
        manager.join("abc").await.unwrap();
        assert!(manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_join_while_connected_switches_rooms() {
        let hub = hub();
        let manager = SessionManager::new(Participant::new("Alice"), hub.clone());
        manager.join("first").await.unwrap();
        let snapshot = manager.join("second").await.unwrap();

        assert_eq!(snapshot.room_id.as_ref().unwrap().as_str(), "second");
        assert_eq!(snapshot.participant_count(), 1);
        assert!(hub.get(&RoomId::parse("first").unwrap()).await.is_none());
    }

    #[tokio::test]
    async fn test_create_room_generates_id() {
        let manager = SessionManager::new(Participant::new("Alice"), hub());
        let room_id = manager.create_room().await.unwrap();

        assert_eq!(room_id.as_str().len(), 8);
        assert_eq!(manager.room_id().await, Some(room_id));
    }

    #[tokio::test]
    async fn test_remote_roster_tracks_presence() {
        let hub = hub();
        let alice = SessionManager::new(Participant::new("Alice"), hub.clone());
        let bob = SessionManager::new(Participant::new("Bob"), hub.clone());

        alice.join("shared").await.unwrap();
        let bob_view = bob.join("shared").await.unwrap();
        let names: Vec<&str> = bob_view.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob"]);

        let alice_view = wait_for_count(&alice, 2).await;
        assert_eq!(alice_view.participants[1].name, "Bob");
        assert_eq!(
            alice_view.status_line().as_deref(),
            Some("Room: shared · 2 participants")
        );

        bob.leave().await;
        let alice_view = wait_for_count(&alice, 1).await;
        assert_eq!(alice_view.participants[0].name, "Alice");
    }

    async fn wait_for_rooms(hub: &RoomHub, expected: usize) {
        for _ in 0..100 {
            if hub.room_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("hub never reached {expected} rooms");
    }

    #[tokio::test]
    async fn test_drop_releases_membership() {
        let hub = hub();
        let bob = SessionManager::new(Participant::new("Bob"), hub.clone());
        bob.join("r").await.unwrap();
        assert_eq!(hub.room_count().await, 1);

        drop(bob);
        wait_for_rooms(&hub, 0).await;

        let alice = SessionManager::new(Participant::new("Alice"), hub.clone());
        let view = alice.join("r").await.unwrap();
        let names: Vec<&str> = view.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Alice"]);

        alice.leave().await;
        assert_eq!(hub.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_drop_announces_departure() {
        let hub = hub();
        let alice = SessionManager::new(Participant::new("Alice"), hub.clone());
        let bob = SessionManager::new(Participant::new("Bob"), hub.clone());
        alice.join("shared").await.unwrap();
        bob.join("shared").await.unwrap();
        wait_for_count(&alice, 2).await;

        drop(bob);
        let view = wait_for_count(&alice, 1).await;
        assert_eq!(view.participants[0].name, "Alice");
        assert_eq!(hub.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_drop_while_disconnected_is_quiet() {
        let hub = hub();
        let manager = SessionManager::new(Participant::new("Alice"), hub.clone());
        manager.join("gone").await.unwrap();
        manager.leave().await;
        drop(manager);
        assert_eq!(hub.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_revision_sink_respects_membership() {
        let manager = SessionManager::new(Participant::new("Alice"), hub());
        let sink = manager.revision_sink();
        assert!(sink.room_link().await.is_none());

        manager.join("abc").await.unwrap();
        let link = sink.room_link().await.unwrap();
        let revision = Revision {
            source: "print('hi')".into(),
            language_id: LanguageId::Python,
        };
        assert!(sink.record(&link, revision.clone()).await);
        assert_eq!(sink.last_applied_revision().await, Some(revision.clone()));

        // Rejoining the same room starts a new membership.
        manager.join("abc").await.unwrap();
        assert!(sink.last_applied_revision().await.is_none());
        assert!(!sink.record(&link, revision).await);
        assert!(sink.take_inbound(&link).await.is_none());

        let fresh = sink.room_link().await.unwrap();
        assert!(fresh.epoch() > link.epoch());
        assert!(sink.take_inbound(&fresh).await.is_some());
        assert!(sink.take_inbound(&fresh).await.is_none());
    }

    #[tokio::test]
    async fn test_local_name_from_identity() {
        let user = User::new("u1", Some("Grace".into()));
        let named = SessionManager::for_user(Some(&user), hub());
        assert_eq!(named.local_participant().name, "Grace");

        let anon = SessionManager::for_user(None, hub());
        assert_eq!(anon.local_participant().name, ANONYMOUS_NAME);
    }
}
