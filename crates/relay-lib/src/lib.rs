// ============================
// crates/relay-lib/src/lib.rs
// ============================
//! Core functionality for the Huddle signaling relay: the room registry,
//! per-room actors, message routing, and the collaborator ports (identity,
//! persistence mirror).

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod mirror;
pub mod registry;
pub mod room_actor;
pub mod session;
pub mod ws_router;

use crate::auth::AuthService;
use crate::config::Settings;
use crate::mirror::MirrorHandle;
use crate::registry::RoomRegistry;
use std::sync::Arc;

/// Application state shared across all connections
#[derive(Clone)]
pub struct AppState {
    /// Registry of live rooms
    pub registry: RoomRegistry,
    /// Identity collaborator verifying connection credentials
    pub auth: Arc<dyn AuthService>,
    /// Fire-and-forget persistence mirror port
    pub mirror: MirrorHandle,
    /// Settings
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(auth: Arc<dyn AuthService>, mirror: MirrorHandle, settings: Settings) -> Self {
        AppState {
            registry: RoomRegistry::new(),
            auth,
            mirror,
            settings: Arc::new(settings),
        }
    }
}
