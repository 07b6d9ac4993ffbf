//! # playground-collab — shared editing sessions for the playground
//!
//! Participants join a room by id and see each other's code and language
//! changes. Transport is an in-process pub/sub hub; ordering is settled by
//! Lamport clocks rather than arrival order.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐  RevisionSink  ┌─────────────┐
//! │ SessionManager │ ◄───────────── │ CodeChannel │ ──► EditorBinding
//! │ (membership)   │                │ (LWW/clock) │
//! └───────┬────────┘                └──────┬──────┘
//!         │ join/leave                     │ send/receive
//!         ▼                                ▼
//!  ┌─────────────────────────────────────────────┐
//!  │ RoomHub: room id → RoomChannel (broadcast)  │
//!  └─────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — room ids, participants, bincode-encoded `WireMessage`
//! - [`broadcast`] — per-room fan-out and the hub that owns the rooms
//! - [`session`] — membership state machine and roster
//! - [`propagation`] — code updates, last-writer-wins, editor binding

pub mod protocol;
pub mod broadcast;
pub mod session;
pub mod propagation;

pub use protocol::{
    CodePayload, CodeUpdateEvent, MessageType, Participant, ProtocolError, RoomId, WireMessage,
};
pub use broadcast::{HubConfig, RoomChannel, RoomHub, RoomStats};
pub use session::{
    ConnectionState, Revision, RevisionSink, RoomLink, SessionError, SessionManager,
    SessionSnapshot,
};
pub use propagation::{
    ChannelConfig, ChannelEvent, ChannelStats, CodeChannel, EditorBinding, SendOutcome,
};
