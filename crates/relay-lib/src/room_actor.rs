// ============================
// crates/relay-lib/src/room_actor.rs
// ============================
//! Per-room actor: owns one room's membership, capacity, lifecycle state, and
//! block list, and serializes every mutation through a command channel.
//!
//! One Tokio task runs per live room. Admission checks and the mutation they
//! guard are therefore atomic with respect to every other operation on the
//! same room, while different rooms proceed independently. All notification
//! fan-out uses the participants' unbounded send paths, so a slow transport
//! never stalls the actor.
use crate::error::AppError;
use crate::metrics as keys;
use crate::mirror::{MirrorHandle, MirrorOp};
use crate::session::ClientHandle;
use huddle_common::{Participant, ServerMessage};
use metrics::counter;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, oneshot};

/// Message sent *into* the actor
#[derive(Debug)]
pub enum RoomCmd {
    Join {
        participant: Participant,
        handle: ClientHandle,
        resp: oneshot::Sender<Result<(), AppError>>,
    },
    Leave {
        uid: String,
        resp: oneshot::Sender<LeaveOutcome>,
    },
    Kick {
        by: String,
        uid: String,
        resp: oneshot::Sender<Result<(), AppError>>,
    },
    Block {
        by: String,
        uid: String,
        resp: oneshot::Sender<Result<(), AppError>>,
    },
    SetCapacity {
        by: String,
        delta: i64,
        resp: oneshot::Sender<Result<(), AppError>>,
    },
    SetState {
        by: String,
        state: String,
        resp: oneshot::Sender<Result<(), AppError>>,
    },
    MediaStarted {
        by: String,
        resp: oneshot::Sender<Result<(), AppError>>,
    },
    Signal {
        from: String,
        to: String,
        payload: serde_json::Value,
    },
}

/// What a departure did to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The host departed: guests were notified and force-closed, the actor
    /// terminated, and the caller must drop the registry entry.
    RoomClosed,
    /// A guest was removed and the remaining members notified.
    GuestRemoved,
    /// The uid was not a member (or the room was already closed); no change.
    NotMember,
}

/// Handle other components keep: the command channel into the actor.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    room_id: String,
    cmd_tx: mpsc::UnboundedSender<RoomCmd>,
}

impl RoomHandle {
    /// Spawn the actor for a new room with `host` as its distinguished,
    /// non-removable member.
    pub fn spawn(
        room_id: String,
        host: Participant,
        host_handle: ClientHandle,
        capacity: usize,
        state: String,
        mirror: MirrorHandle,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        mirror.record(MirrorOp::UpsertRoom {
            room_id: room_id.clone(),
            state: state.clone(),
            capacity,
            media_started: false,
        });
        mirror.record(MirrorOp::UpsertParticipant {
            room_id: room_id.clone(),
            participant: host.clone(),
            host: true,
        });
        counter!(keys::ROOM_CREATED).increment(1);

        let actor = RoomActor::new(room_id.clone(), host, host_handle, capacity, state, mirror);
        tokio::spawn(actor.run(cmd_rx));

        RoomHandle { room_id, cmd_tx }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    fn closed(&self) -> AppError {
        AppError::NotFound(format!("room {} is closed", self.room_id))
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), AppError>>) -> RoomCmd,
    ) -> Result<(), AppError> {
        let (resp, rx) = oneshot::channel();
        self.cmd_tx.send(make(resp)).map_err(|_| self.closed())?;
        rx.await.map_err(|_| self.closed())?
    }

    pub async fn join(
        &self,
        participant: Participant,
        handle: ClientHandle,
    ) -> Result<(), AppError> {
        self.request(|resp| RoomCmd::Join {
            participant,
            handle,
            resp,
        })
        .await
    }

    /// Remove `uid` from the room. Resolves to [`LeaveOutcome::NotMember`]
    /// when the actor is already gone, which makes duplicate departures
    /// (local close racing remote close) harmless.
    pub async fn leave(&self, uid: &str) -> LeaveOutcome {
        let (resp, rx) = oneshot::channel();
        let cmd = RoomCmd::Leave {
            uid: uid.to_string(),
            resp,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return LeaveOutcome::NotMember;
        }
        rx.await.unwrap_or(LeaveOutcome::NotMember)
    }

    pub async fn kick(&self, by: &str, uid: &str) -> Result<(), AppError> {
        let by = by.to_string();
        let uid = uid.to_string();
        self.request(|resp| RoomCmd::Kick { by, uid, resp }).await
    }

    pub async fn block(&self, by: &str, uid: &str) -> Result<(), AppError> {
        let by = by.to_string();
        let uid = uid.to_string();
        self.request(|resp| RoomCmd::Block { by, uid, resp }).await
    }

    pub async fn set_capacity(&self, by: &str, delta: i64) -> Result<(), AppError> {
        let by = by.to_string();
        self.request(|resp| RoomCmd::SetCapacity { by, delta, resp })
            .await
    }

    pub async fn set_state(&self, by: &str, state: &str) -> Result<(), AppError> {
        let by = by.to_string();
        let state = state.to_string();
        self.request(|resp| RoomCmd::SetState { by, state, resp })
            .await
    }

    pub async fn media_started(&self, by: &str) -> Result<(), AppError> {
        let by = by.to_string();
        self.request(|resp| RoomCmd::MediaStarted { by, resp })
            .await
    }

    /// Route an opaque payload to another participant. Fire-and-forget: an
    /// absent target (or an already-closed room) is a silent drop.
    pub fn signal(&self, from: String, to: String, payload: serde_json::Value) {
        let _ = self.cmd_tx.send(RoomCmd::Signal { from, to, payload });
    }
}

/// One room's pure data state. Transport handles live next to it in the
/// actor, not inside it, so the mirror projection stays plain data.
struct Room {
    id: String,
    state: String,
    capacity: usize,
    media_started: bool,
    host: Participant,
    guests: HashMap<String, Participant>,
    blocked: HashSet<String>,
}

pub struct RoomActor {
    room: Room,
    /// uid -> transport handle, host included
    handles: HashMap<String, ClientHandle>,
    mirror: MirrorHandle,
}

impl RoomActor {
    fn new(
        room_id: String,
        host: Participant,
        host_handle: ClientHandle,
        capacity: usize,
        state: String,
        mirror: MirrorHandle,
    ) -> Self {
        let mut handles = HashMap::new();
        handles.insert(host.uid.clone(), host_handle);
        RoomActor {
            room: Room {
                id: room_id,
                state,
                capacity,
                media_started: false,
                host,
                guests: HashMap::new(),
                blocked: HashSet::new(),
            },
            handles,
            mirror,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomCmd>) {
        while let Some(cmd) = rx.recv().await {
            if !self.handle_cmd(cmd) {
                break;
            }
        }
    }

    /// Apply one command. Returns `false` once the room is closed.
    fn handle_cmd(&mut self, cmd: RoomCmd) -> bool {
        match cmd {
            RoomCmd::Join {
                participant,
                handle,
                resp,
            } => {
                let _ = resp.send(self.join(participant, handle));
            }
            RoomCmd::Leave { uid, resp } => {
                let outcome = self.leave(&uid);
                let _ = resp.send(outcome);
                return outcome != LeaveOutcome::RoomClosed;
            }
            RoomCmd::Kick { by, uid, resp } => {
                let _ = resp.send(self.kick(&by, &uid));
            }
            RoomCmd::Block { by, uid, resp } => {
                let _ = resp.send(self.block(&by, &uid));
            }
            RoomCmd::SetCapacity { by, delta, resp } => {
                let _ = resp.send(self.set_capacity(&by, delta));
            }
            RoomCmd::SetState { by, state, resp } => {
                let _ = resp.send(self.set_state(&by, state));
            }
            RoomCmd::MediaStarted { by, resp } => {
                let _ = resp.send(self.media_started(&by));
            }
            RoomCmd::Signal { from, to, payload } => {
                self.signal(&from, &to, payload);
            }
        }
        true
    }

    fn is_member(&self, uid: &str) -> bool {
        uid == self.room.host.uid || self.room.guests.contains_key(uid)
    }

    fn require_host(&self, uid: &str) -> Result<(), AppError> {
        if uid == self.room.host.uid {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "only the host may change the room".to_string(),
            ))
        }
    }

    fn broadcast(&self, msg: &ServerMessage) {
        for handle in self.handles.values() {
            handle.send(msg.clone());
        }
    }

    fn join(&mut self, participant: Participant, handle: ClientHandle) -> Result<(), AppError> {
        if self.room.blocked.contains(&participant.uid) {
            counter!(keys::GUEST_REJECTED).increment(1);
            return Err(AppError::Forbidden("blocked from this room".to_string()));
        }
        if self.is_member(&participant.uid) {
            return Err(AppError::Conflict("already a member".to_string()));
        }
        if self.room.guests.len() >= self.room.capacity {
            counter!(keys::GUEST_REJECTED).increment(1);
            return Err(AppError::Full);
        }

        // Everyone already present learns about the newcomer
        self.broadcast(&ServerMessage::GuestJoined {
            participant: participant.clone(),
        });

        // The newcomer gets the room context: host first, then guests
        let mut participants = vec![self.room.host.clone()];
        participants.extend(self.room.guests.values().cloned());
        handle.send(ServerMessage::Joined {
            room_id: self.room.id.clone(),
            state: self.room.state.clone(),
            capacity: self.room.capacity,
            media_started: self.room.media_started,
            participants,
        });

        self.handles.insert(participant.uid.clone(), handle);
        self.room
            .guests
            .insert(participant.uid.clone(), participant.clone());
        self.mirror.record(MirrorOp::UpsertParticipant {
            room_id: self.room.id.clone(),
            participant,
            host: false,
        });
        counter!(keys::GUEST_JOINED).increment(1);
        Ok(())
    }

    fn leave(&mut self, uid: &str) -> LeaveOutcome {
        if uid == self.room.host.uid {
            self.close_room();
            return LeaveOutcome::RoomClosed;
        }
        if self.room.guests.remove(uid).is_none() {
            return LeaveOutcome::NotMember;
        }
        self.handles.remove(uid);
        self.mirror.record(MirrorOp::RemoveParticipant {
            room_id: self.room.id.clone(),
            uid: uid.to_string(),
        });
        self.broadcast(&ServerMessage::GuestLeft {
            uid: uid.to_string(),
        });
        LeaveOutcome::GuestRemoved
    }

    /// Host departure is terminal: every guest is told and force-closed.
    fn close_room(&mut self) {
        for (uid, handle) in &self.handles {
            if uid == &self.room.host.uid {
                continue;
            }
            handle.send(ServerMessage::HostLeft);
            handle.close();
        }
        self.mirror.record(MirrorOp::RemoveRoom {
            room_id: self.room.id.clone(),
        });
        counter!(keys::ROOM_CLOSED).increment(1);
        tracing::info!(room_id = %self.room.id, "room closed by host departure");
    }

    fn kick(&mut self, by: &str, uid: &str) -> Result<(), AppError> {
        self.require_host(by)?;
        if !self.room.guests.contains_key(uid) {
            return Err(AppError::NotFound(format!("no guest {uid} in the room")));
        }
        self.expel(uid);
        Ok(())
    }

    /// Shared tail of kick and block: notify and close the target, remove it,
    /// tell everyone left.
    fn expel(&mut self, uid: &str) {
        if let Some(handle) = self.handles.remove(uid) {
            handle.send(ServerMessage::Expelled);
            handle.close();
        }
        self.room.guests.remove(uid);
        self.mirror.record(MirrorOp::RemoveParticipant {
            room_id: self.room.id.clone(),
            uid: uid.to_string(),
        });
        self.broadcast(&ServerMessage::GuestExpelled {
            uid: uid.to_string(),
        });
    }

    /// Blocking is independent of membership: a never-joined uid can be
    /// pre-blocked. A currently-present guest is expelled as a side effect.
    fn block(&mut self, by: &str, uid: &str) -> Result<(), AppError> {
        self.require_host(by)?;
        self.room.blocked.insert(uid.to_string());
        self.mirror.record(MirrorOp::SetBlocked {
            room_id: self.room.id.clone(),
            uid: uid.to_string(),
        });
        if self.room.guests.contains_key(uid) {
            self.expel(uid);
        }
        Ok(())
    }

    fn set_capacity(&mut self, by: &str, delta: i64) -> Result<(), AppError> {
        self.require_host(by)?;
        self.room.capacity = self
            .room
            .capacity
            .saturating_add_signed(delta as isize)
            .max(1);
        self.mirror.record(MirrorOp::SetField {
            room_id: self.room.id.clone(),
            field: "capacity".to_string(),
            value: json!(self.room.capacity),
        });
        self.broadcast(&ServerMessage::RoomUpdated);
        Ok(())
    }

    fn set_state(&mut self, by: &str, state: String) -> Result<(), AppError> {
        self.require_host(by)?;
        self.room.state = state;
        self.mirror.record(MirrorOp::SetField {
            room_id: self.room.id.clone(),
            field: "state".to_string(),
            value: json!(self.room.state),
        });
        self.broadcast(&ServerMessage::RoomUpdated);
        Ok(())
    }

    fn media_started(&mut self, by: &str) -> Result<(), AppError> {
        self.require_host(by)?;
        self.room.media_started = true;
        self.mirror.record(MirrorOp::SetField {
            room_id: self.room.id.clone(),
            field: "media_started".to_string(),
            value: json!(true),
        });
        self.broadcast(&ServerMessage::RoomUpdated);
        Ok(())
    }

    /// Unicast the opaque payload; the relay never inspects it. A non-member
    /// sender or an absent target is a silent drop.
    fn signal(&self, from: &str, to: &str, payload: serde_json::Value) {
        if !self.is_member(from) {
            tracing::debug!(room_id = %self.room.id, from, "signal from non-member dropped");
            return;
        }
        match self.handles.get(to) {
            Some(handle) => {
                handle.send(ServerMessage::Signal {
                    from: from.to_string(),
                    payload,
                });
                counter!(keys::SIGNAL_RELAYED).increment(1);
            }
            None => {
                tracing::debug!(room_id = %self.room.id, to, "signal target absent, dropped");
            }
        }
    }
}
