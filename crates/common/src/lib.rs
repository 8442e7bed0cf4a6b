// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between Huddle clients and the relay.
//! This module defines the WebSocket envelope kinds and supporting types.

use serde::{Deserialize, Serialize};

/// A verified room participant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Externally issued identifier, verified at connection time
    pub uid: String,
    /// Display name supplied by the client
    pub name: String,
}

/// Display attributes a client supplies when creating or joining a room.
/// The relay pairs these with the uid verified from the connection credential.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Profile {
    /// Display name
    pub name: String,
}

/// Envelopes sent from client to relay
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Create a new room with the sender as host
    /// # Fields
    /// * `room_id` - Client-supplied unique room identifier
    /// * `participant` - Display attributes of the host
    /// * `capacity` - Maximum number of guests (at least 1)
    /// * `state` - Initial lifecycle state, opaque to the relay
    CreateRoom {
        room_id: String,
        participant: Profile,
        capacity: usize,
        state: String,
    },
    /// Join an existing room as a guest
    JoinRoom {
        room_id: String,
        participant: Profile,
    },
    /// Leave the room the connection is currently in
    LeaveRoom,
    /// Expel a guest from the room (host only)
    Kick { uid: String },
    /// Deny a uid admission permanently, expelling it first if present (host only)
    Block { uid: String },
    /// Relay an opaque handshake payload to another participant in the room
    Signal {
        to: String,
        payload: serde_json::Value,
    },
    /// Grow or shrink the room capacity by one (host only)
    SetCapacity { delta: i64 },
    /// Replace the room's opaque lifecycle state (host only)
    SetState { state: String },
    /// Mark the room's media session as started (host only)
    MediaStarted,
}

impl ClientMessage {
    /// Every envelope kind the relay recognizes.
    pub const KINDS: &'static [&'static str] = &[
        "create-room",
        "join-room",
        "leave-room",
        "kick",
        "block",
        "signal",
        "set-capacity",
        "set-state",
        "media-started",
    ];
}

/// Envelopes sent from relay to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Error response, scoped to the request that caused it
    Error { message: String },
    /// The sender's room was created and it is now the host
    RoomCreated { room_id: String },
    /// The sender was admitted; carries the current room context
    Joined {
        room_id: String,
        state: String,
        capacity: usize,
        media_started: bool,
        participants: Vec<Participant>,
    },
    /// A new guest entered the sender's room
    GuestJoined { participant: Participant },
    /// A guest left the sender's room
    GuestLeft { uid: String },
    /// A guest was expelled from the sender's room
    GuestExpelled { uid: String },
    /// The sender was expelled; its connection will be closed
    Expelled,
    /// The host departed; the room is gone and the connection will be closed
    HostLeft,
    /// Room capacity, lifecycle state, or media flag changed
    RoomUpdated,
    /// Opaque handshake payload relayed from another participant
    Signal {
        from: String,
        payload: serde_json::Value,
    },
}
