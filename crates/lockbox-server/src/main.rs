mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use lockbox_api::auth::{AppState, AppStateInner};
use lockbox_crypto::KeyMaterialService;
use lockbox_gateway::dispatcher::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lockbox=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Key material provider, fixed for the life of the process
    let crypto = KeyMaterialService::select(config.crypto_provider, config.allow_insecure_crypto)
        .map_err(|e| {
            anyhow::anyhow!(
                "{} (set LOCKBOX_CRYPTO_PROVIDER=simulated and LOCKBOX_ALLOW_INSECURE_CRYPTO=true to run without security)",
                e
            )
        })?;
    if crypto.is_degraded() {
        warn!("Running in DEGRADED crypto mode '{}'; do not use in production", crypto.mode());
    } else {
        info!(
            "Key material provider: {} / {}",
            crypto.kem_algorithm(),
            crypto.signature_algorithm()
        );
    }

    // Init database
    let db = lockbox_db::Database::open(&config.db_path)?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret,
        dispatcher: Dispatcher::with_push_timeout(config.push_timeout),
        crypto,
        conversation_policy: config.conversation_policy,
    });
    info!("Conversation policy: {:?}", state.conversation_policy);

    let app = lockbox_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("LockBox server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
