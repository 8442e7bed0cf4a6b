// ============================
// crates/relay-lib/src/mirror.rs
// ============================
//! Persistence mirror: one-way projection of room state into flat JSON files.
//!
//! The mirror is advisory. Room actors push [`MirrorOp`]s onto an unbounded
//! queue after each successful mutation and never wait for the result; the
//! writer task applies them to `rooms/<room_id>.json` under the data dir.
//! Write failures are logged and swallowed, never surfaced to a client.
use crate::error::AppError;
use huddle_common::Participant;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::{fs as tokio_fs, sync::mpsc};

/// A single projection instruction.
#[derive(Debug, Clone)]
pub enum MirrorOp {
    UpsertRoom {
        room_id: String,
        state: String,
        capacity: usize,
        media_started: bool,
    },
    RemoveRoom {
        room_id: String,
    },
    UpsertParticipant {
        room_id: String,
        participant: Participant,
        host: bool,
    },
    RemoveParticipant {
        room_id: String,
        uid: String,
    },
    SetBlocked {
        room_id: String,
        uid: String,
    },
    SetField {
        room_id: String,
        field: String,
        value: Value,
    },
}

impl MirrorOp {
    fn room_id(&self) -> &str {
        match self {
            MirrorOp::UpsertRoom { room_id, .. }
            | MirrorOp::RemoveRoom { room_id }
            | MirrorOp::UpsertParticipant { room_id, .. }
            | MirrorOp::RemoveParticipant { room_id, .. }
            | MirrorOp::SetBlocked { room_id, .. }
            | MirrorOp::SetField { room_id, .. } => room_id,
        }
    }
}

/// Fire-and-forget port the room actors write to.
#[derive(Clone, Debug)]
pub struct MirrorHandle {
    tx: mpsc::UnboundedSender<MirrorOp>,
}

impl MirrorHandle {
    pub fn new(tx: mpsc::UnboundedSender<MirrorOp>) -> Self {
        MirrorHandle { tx }
    }

    /// A handle that drops every projection. Useful when mirroring is
    /// disabled and in tests that do not observe the mirror.
    pub fn noop() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        MirrorHandle { tx }
    }

    /// Enqueue a projection; never blocks, never fails the caller.
    pub fn record(&self, op: MirrorOp) {
        let _ = self.tx.send(op);
    }
}

/// Flat-file store the writer task applies projections to.
#[derive(Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("rooms"))?;
        Ok(Self { root })
    }

    fn room_path(&self, room_id: &str) -> PathBuf {
        self.root.join("rooms").join(format!("{room_id}.json"))
    }

    async fn load_doc(&self, room_id: &str) -> Result<Value, AppError> {
        let path = self.room_path(room_id);
        match tokio_fs::read_to_string(&path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(json!({
                "room_id": room_id,
                "participants": {},
                "blocked": [],
            })),
            Err(e) => Err(e.into()),
        }
    }

    async fn store_doc(&self, room_id: &str, doc: &Value) -> Result<(), AppError> {
        let path = self.room_path(room_id);
        let json = serde_json::to_string_pretty(doc)?;
        tokio_fs::write(path, json).await?;
        Ok(())
    }

    /// Apply one projection to the on-disk document.
    pub async fn apply(&self, op: MirrorOp) -> Result<(), AppError> {
        if let MirrorOp::RemoveRoom { room_id } = &op {
            match tokio_fs::remove_file(self.room_path(room_id)).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }

        let room_id = op.room_id().to_string();
        let mut doc = self.load_doc(&room_id).await?;
        match op {
            MirrorOp::UpsertRoom {
                state,
                capacity,
                media_started,
                ..
            } => {
                doc["state"] = json!(state);
                doc["capacity"] = json!(capacity);
                doc["media_started"] = json!(media_started);
            }
            MirrorOp::UpsertParticipant {
                participant, host, ..
            } => {
                doc["participants"][&participant.uid] = json!({
                    "uid": participant.uid,
                    "name": participant.name,
                    "host": host,
                });
            }
            MirrorOp::RemoveParticipant { uid, .. } => {
                if let Some(map) = doc["participants"].as_object_mut() {
                    map.remove(&uid);
                }
            }
            MirrorOp::SetBlocked { uid, .. } => {
                let blocked = doc["blocked"].as_array_mut();
                match blocked {
                    Some(list) if !list.iter().any(|v| v == &json!(uid)) => {
                        list.push(json!(uid));
                    }
                    Some(_) => {}
                    None => doc["blocked"] = json!([uid]),
                }
            }
            MirrorOp::SetField { field, value, .. } => {
                doc[field] = value;
            }
            // handled by the early return above
            MirrorOp::RemoveRoom { .. } => {}
        }
        self.store_doc(&room_id, &doc).await
    }
}

/// Spawn the writer task and return the handle the actors record through.
pub fn spawn_writer(store: MirrorStore) -> MirrorHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<MirrorOp>();
    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            let room_id = op.room_id().to_string();
            if let Err(e) = store.apply(op).await {
                tracing::warn!(%room_id, error = %e, "mirror write failed");
            }
        }
    });
    MirrorHandle::new(tx)
}
