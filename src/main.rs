// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wallet_controller::{
    api::router,
    blockchain::RpcProvider,
    config::{Config, LogFormat, DEFAULT_LOG_FILTER},
    state::AppState,
    storage::RedbStore,
};

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let store = RedbStore::open_in_dir(&config.data_dir)?;
    let provider = RpcProvider::new(&config.rpc_url)?;
    info!(
        data_dir = %config.data_dir.display(),
        rpc_url = %provider.rpc_url(),
        chain_id = config.controller.chain_id,
        "Controller storage and chain provider ready"
    );

    let mut state = AppState::new(Arc::new(store), Arc::new(provider), config.controller);
    if let Some(origins) = config.allowed_origins {
        info!(count = origins.len(), "Origin whitelist enabled");
        state = state.with_allowed_origins(origins);
    }
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Wallet controller listening (docs at /docs)");

    let shutdown = CancellationToken::new();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    info!("Server stopped");
    Ok(())
}
