// ============================
// crates/relay-lib/src/session.rs
// ============================
//! Per-connection session state and the outbound send path.
use huddle_common::ServerMessage;
use tokio::sync::mpsc;

/// Frame pushed to a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Deliver an envelope to the client
    Message(ServerMessage),
    /// Close the transport (kick, block, host-left cascade)
    Close,
}

/// Handle other components keep to deliver notifications to one participant.
/// Sends enqueue on an unbounded channel, so a slow or dead consumer never
/// stalls the room actor holding this handle.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    uid: String,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ClientHandle {
    pub fn new(uid: String, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        ClientHandle { uid, tx }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Best-effort enqueue. A gone receiver only means the connection has
    /// already closed, which the disconnect cleanup handles on its own.
    pub fn send(&self, msg: ServerMessage) {
        let _ = self.tx.send(Outbound::Message(msg));
    }

    /// Ask the writer task to close the underlying transport.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// Transient (participant, room) context for one connection.
///
/// `room_id` is set only by a successful create or join and cleared by leave
/// and by the disconnect cleanup; later envelopes never infer a room from
/// their own fields.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub uid: String,
    pub room_id: Option<String>,
}

impl SessionContext {
    pub fn new(uid: String) -> Self {
        SessionContext { uid, room_id: None }
    }
}
