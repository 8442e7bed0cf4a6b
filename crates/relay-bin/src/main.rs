// ============================
// crates/relay-bin/src/main.rs
// ============================
//! Tokio / Axum entry-point for the Huddle signaling relay.
use relay_lib::auth::SessionManager;
use relay_lib::{config, mirror, ws_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = config::load_settings()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| settings.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = mirror::MirrorStore::new(&settings.data_dir)?;
    let mirror = mirror::spawn_writer(store);
    let auth = Arc::new(SessionManager::new(Duration::from_secs(
        settings.session_ttl_secs,
    )));

    let addr = settings.bind_addr;
    let state = AppState::new(auth, mirror, settings);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = ws_router::router(state).layer(cors);

    tracing::info!(%addr, "listening");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
