// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use polaris_auth_server::{
    api::router,
    auth::OAuthProvider,
    config::{AppConfig, LogFormat, DEFAULT_LOG_FILTER},
    state::AppState,
    storage::CredentialStore,
};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    let db_path = config.database_path();
    tracing::info!(path = %db_path.display(), "Opening credential store");
    let store = CredentialStore::open_with_retry(&db_path, &config.store_retry).await?;

    let mut state = AppState::new(Arc::new(store), config.session.clone());
    match config.oauth.clone() {
        Some(oauth) => {
            state = state.with_identity_provider(OAuthProvider::new(oauth)?);
            tracing::info!("OAuth login enabled");
        }
        None => tracing::warn!("OAUTH_CLIENT_ID/OAUTH_CLIENT_SECRET not set, login disabled"),
    }
    if config.session.revoke_on_rotation {
        tracing::info!("Refresh tokens are revoked on rotation");
    }

    let app = router(state);
    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Polaris auth server listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
