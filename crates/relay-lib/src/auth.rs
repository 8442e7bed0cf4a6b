// ============================
// crates/relay-lib/src/auth.rs
// ============================
//! Credential verification for incoming connections.
use crate::error::AppError;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Identity collaborator: resolves an opaque credential to a verified
/// participant id. An unverifiable credential is fatal for the connection.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<String, AppError>;
}

#[derive(Clone)]
struct Identity {
    uid: String,
    expires_at: SystemTime,
}

/// Token-table implementation of [`AuthService`], used when no external
/// identity provider is wired in. Tokens are minted by `issue` and expire
/// after the configured TTL.
#[derive(Clone)]
pub struct SessionManager {
    ttl: Duration,
    sessions: Arc<RwLock<HashMap<String, Identity>>>,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        SessionManager {
            ttl,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Mint a credential for `uid`.
    pub async fn issue(&self, uid: &str) -> String {
        let token = Uuid::new_v4().to_string();
        let identity = Identity {
            uid: uid.to_string(),
            expires_at: SystemTime::now() + self.ttl,
        };
        let mut sessions = self.sessions.write().await;
        sessions.insert(token.clone(), identity);
        token
    }
}

#[async_trait]
impl AuthService for SessionManager {
    async fn verify(&self, credential: &str) -> Result<String, AppError> {
        let sessions = self.sessions.read().await;
        match sessions.get(credential) {
            Some(identity) if SystemTime::now() < identity.expires_at => {
                Ok(identity.uid.clone())
            }
            _ => Err(AppError::Unauthorized(
                "invalid or expired credential".to_string(),
            )),
        }
    }
}
