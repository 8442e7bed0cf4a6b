// ============================
// crates/relay-lib/src/registry.rs
// ============================
//! Authoritative mapping from room id to live room handle.
use crate::error::AppError;
use crate::mirror::MirrorHandle;
use crate::room_actor::RoomHandle;
use crate::session::ClientHandle;
use dashmap::{mapref::entry::Entry, DashMap};
use huddle_common::Participant;
use std::sync::Arc;

/// Registry of every live room. Creation, lookup, and destruction of a given
/// id are serialized by the map's per-key locking; different ids never
/// interfere.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, RoomHandle>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        RoomRegistry {
            rooms: Arc::new(DashMap::new()),
        }
    }

    /// Create a room and spawn its actor. First writer wins for an id's
    /// lifetime; a second create for a live id is a non-retryable conflict.
    pub fn create(
        &self,
        room_id: &str,
        host: Participant,
        host_handle: ClientHandle,
        capacity: usize,
        state: String,
        mirror: MirrorHandle,
    ) -> Result<RoomHandle, AppError> {
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "room {room_id} already exists"
            ))),
            Entry::Vacant(vacant) => {
                let handle = RoomHandle::spawn(
                    room_id.to_string(),
                    host,
                    host_handle,
                    capacity,
                    state,
                    mirror,
                );
                vacant.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    /// Idempotent removal; a no-op if the id is absent.
    pub fn destroy(&self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
