//! Code propagation between room participants.
//!
//! Outgoing edits are stamped with a Lamport clock. Incoming edits are
//! accepted per language only when `(clock, origin)` beats the last accepted
//! pair for that language, so every participant settles on the same text
//! whatever order the room delivers in.
//!
//! With `echo_local` (the default) a participant also receives its own
//! updates, which gives the single-user loopback behaviour.

use std::collections::HashMap;
use std::sync::Arc;

use playground_core::language::descriptor;
use playground_core::{is_default_source, LanguageId};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use uuid::Uuid;

use crate::broadcast::RoomHub;
use crate::protocol::{
    CodePayload, CodeUpdateEvent, MessageType, Participant, ProtocolError, WireMessage,
};
use crate::session::{Inbound, Revision, RevisionSink, RoomLink, SessionManager};

/// Channel behaviour.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Deliver our own updates back to us.
    pub echo_local: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { echo_local: true }
    }
}

impl ChannelConfig {
    /// Only other participants' updates are delivered.
    pub fn multi_party() -> Self {
        Self { echo_local: false }
    }
}

/// Result of [`CodeChannel::send_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Published to the room; `receivers` counts live subscriptions.
    Sent { receivers: usize },
    /// No room joined; nothing was sent.
    NotConnected,
}

/// What a listener can observe on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A remote edit won last-writer-wins and was recorded.
    CodeUpdate(CodeUpdateEvent),
    PeerJoined(Participant),
    PeerLeft(Uuid),
}

/// Counters for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub sent: u64,
    pub accepted: u64,
    /// Updates that arrived with an older `(clock, origin)` and were ignored.
    pub superseded: u64,
}

struct Attachment {
    link: RoomLink,
    rx: Option<Inbound>,
}

/// One participant's end of the room's code traffic.
pub struct CodeChannel {
    local_id: Uuid,
    sink: RevisionSink,
    hub: Arc<RoomHub>,
    config: ChannelConfig,
    attached: Option<Attachment>,
    clock: u64,
    accepted: HashMap<LanguageId, (u64, Uuid)>,
    stats: ChannelStats,
}

impl CodeChannel {
    pub fn new(session: &SessionManager, config: ChannelConfig) -> Self {
        Self {
            local_id: session.local_participant().id,
            sink: session.revision_sink(),
            hub: session.hub().clone(),
            config,
            attached: None,
            clock: 0,
            accepted: HashMap::new(),
            stats: ChannelStats::default(),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Current Lamport clock.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Follow the session: attach to a new membership, or drop per-room
    /// state once the session has left.
    async fn sync(&mut self) -> Option<RoomLink> {
        let Some(link) = self.sink.room_link().await else {
            self.detach();
            return None;
        };

        let stale = self.attached.as_ref().map(|a| &a.link) != Some(&link);
        if stale {
            self.detach();
            let rx = match self.sink.take_inbound(&link).await {
                Some(rx) => Some(rx),
                // Another channel already claimed the join-time receiver.
                None => self.hub.get(&link.room_id).await.map(|room| room.subscribe()),
            };
            log::debug!("Channel attached to room {}", link.room_id);
            self.attached = Some(Attachment {
                link: link.clone(),
                rx,
            });
        }
        Some(link)
    }

    fn detach(&mut self) {
        if self.attached.take().is_some() {
            self.clock = 0;
            self.accepted.clear();
        }
    }

    /// Publish a local edit. A no-op while disconnected.
    pub async fn send_update(
        &mut self,
        source: &str,
        language_id: LanguageId,
    ) -> Result<SendOutcome, ProtocolError> {
        let Some(link) = self.sync().await else {
            log::debug!("Not connected; local update not sent");
            return Ok(SendOutcome::NotConnected);
        };
        let Some(room) = self.hub.get(&link.room_id).await else {
            log::debug!("Room {} is gone; local update not sent", link.room_id);
            return Ok(SendOutcome::NotConnected);
        };

        self.clock += 1;
        let payload = CodePayload {
            source: source.to_string(),
            language: language_id,
        };
        let msg = WireMessage::code_update(self.local_id, link.room_id.clone(), self.clock, &payload)?;
        if !self.config.echo_local {
            self.accepted.insert(language_id, (self.clock, self.local_id));
        }

        let receivers = room.broadcast(&msg)?;
        self.stats.sent += 1;
        log::debug!(
            "Sent {language_id} update @{} to {receivers} receivers in {}",
            self.clock,
            link.room_id
        );
        Ok(SendOutcome::Sent { receivers })
    }

    /// Drain everything already delivered to this participant.
    pub async fn poll_events(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        let Some(link) = self.sync().await else {
            return events;
        };

        loop {
            let Some(rx) = self.attached.as_mut().and_then(|a| a.rx.as_mut()) else {
                break;
            };
            let bytes = match rx.try_recv() {
                Ok(bytes) => bytes,
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("Channel lagged by {skipped} messages in {}", link.room_id);
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            };
            if let Some(event) = self.handle(&link, &bytes).await {
                events.push(event);
            }
        }
        events
    }

    /// Accepted code updates among [`poll_events`](Self::poll_events).
    pub async fn poll_updates(&mut self) -> Vec<CodeUpdateEvent> {
        self.poll_events()
            .await
            .into_iter()
            .filter_map(|event| match event {
                ChannelEvent::CodeUpdate(update) => Some(update),
                _ => None,
            })
            .collect()
    }

    /// Wait for the next event. Returns `None` when disconnected or when
    /// the room closes.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let link = self.sync().await?;
            let rx = self.attached.as_mut()?.rx.as_mut()?;
            let bytes = match rx.recv().await {
                Ok(bytes) => bytes,
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Channel lagged by {skipped} messages in {}", link.room_id);
                    continue;
                }
                Err(RecvError::Closed) => {
                    self.detach();
                    return None;
                }
            };
            if let Some(event) = self.handle(&link, &bytes).await {
                return Some(event);
            }
        }
    }

    /// Wait for the next accepted code update.
    pub async fn next_update(&mut self) -> Option<CodeUpdateEvent> {
        loop {
            if let ChannelEvent::CodeUpdate(update) = self.next_event().await? {
                return Some(update);
            }
        }
    }

    /// Feed a frame received from an external transport.
    pub async fn deliver(&mut self, bytes: &[u8]) -> Option<ChannelEvent> {
        let link = self.sync().await?;
        self.handle(&link, bytes).await
    }

    async fn handle(&mut self, link: &RoomLink, bytes: &[u8]) -> Option<ChannelEvent> {
        let msg = match WireMessage::decode(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Dropping undecodable room message: {e}");
                return None;
            }
        };
        if msg.room_id != link.room_id {
            log::debug!("Ignoring message for room {}", msg.room_id);
            return None;
        }

        match msg.msg_type {
            MessageType::CodeUpdate => self.accept_code(link, &msg).await,
            MessageType::PeerJoined if msg.origin != self.local_id => match msg.participant() {
                Ok(info) => Some(ChannelEvent::PeerJoined(info)),
                Err(e) => {
                    log::warn!("Malformed join announcement: {e}");
                    None
                }
            },
            MessageType::PeerLeft if msg.origin != self.local_id => {
                Some(ChannelEvent::PeerLeft(msg.origin))
            }
            _ => None,
        }
    }

    async fn accept_code(&mut self, link: &RoomLink, msg: &WireMessage) -> Option<ChannelEvent> {
        self.clock = self.clock.max(msg.clock);
        if msg.origin == self.local_id && !self.config.echo_local {
            return None;
        }

        let event = match msg.to_event() {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Malformed code update from {}: {e}", msg.origin);
                return None;
            }
        };

        let stamp = (msg.clock, msg.origin);
        if let Some(previous) = self.accepted.get(&event.language_id) {
            if *previous >= stamp {
                self.stats.superseded += 1;
                log::debug!(
                    "Ignoring {} update @{} from {}: already at @{}",
                    event.language_id,
                    msg.clock,
                    msg.origin,
                    previous.0
                );
                return None;
            }
        }
        self.accepted.insert(event.language_id, stamp);

        let revision = Revision {
            source: event.source.clone(),
            language_id: event.language_id,
        };
        if !self.sink.record(link, revision).await {
            return None;
        }
        self.stats.accepted += 1;
        Some(ChannelEvent::CodeUpdate(event))
    }
}

/// Editor state a remote update is applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorBinding {
    selected_language: LanguageId,
    text: String,
}

impl Default for EditorBinding {
    fn default() -> Self {
        Self::new(LanguageId::JavaScript)
    }
}

impl EditorBinding {
    /// Editor showing the starter snippet of `language`.
    pub fn new(language: LanguageId) -> Self {
        Self::with_text(language, descriptor(language).default_source)
    }

    pub fn with_text(language: LanguageId, text: impl Into<String>) -> Self {
        Self {
            selected_language: language,
            text: text.into(),
        }
    }

    pub fn selected_language(&self) -> LanguageId {
        self.selected_language
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn edit(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Replace the text when the update is for the selected language.
    pub fn apply_remote(&mut self, event: &CodeUpdateEvent) -> bool {
        if event.language_id != self.selected_language {
            return false;
        }
        self.text.clone_from(&event.source);
        true
    }

    /// Switch language. A retained revision for the new language wins;
    /// otherwise blank or starter text becomes the new starter snippet.
    /// Returns whether the text changed.
    pub fn select_language(&mut self, language: LanguageId, retained: Option<&Revision>) -> bool {
        self.selected_language = language;
        let next = match retained {
            Some(revision) if revision.language_id == language => revision.source.as_str(),
            _ if self.text.trim().is_empty() || is_default_source(&self.text) => {
                descriptor(language).default_source
            }
            _ => return false,
        };
        if self.text == next {
            return false;
        }
        self.text = next.to_string();
        true
    }
}
