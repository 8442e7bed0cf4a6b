// ==============
// crates/relay-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_CLOSED: &str = "room.closed";
pub const GUEST_JOINED: &str = "room.guest_joined";
pub const GUEST_REJECTED: &str = "room.guest_rejected";
pub const SIGNAL_RELAYED: &str = "signal.relayed";
