// ============================
// crates/relay-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Root directory for the persistence mirror
    pub data_dir: PathBuf,
    /// Log level used when RUST_LOG is unset
    pub log_level: String,
    /// Credential TTL in seconds
    pub session_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            session_ttl_secs: 60 * 60 * 24, // 24 hours
        }
    }
}

/// Load settings from defaults, `huddle.toml`, and `HUDDLE_`-prefixed
/// environment variables, later sources winning.
pub fn load_settings() -> Result<Settings> {
    let settings = Figment::from(Serialized::defaults(Settings::default()))
        .merge(Toml::file("huddle.toml"))
        .merge(Env::prefixed("HUDDLE_"))
        .extract()?;

    Ok(settings)
}
