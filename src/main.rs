// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use samoa_bankcard_sync::{
    algorand::AlgodClient,
    api::router,
    config::{LogFormat, ServiceConfig, DEFAULT_LOG_FILTER},
    indexer::RoundIndexer,
    state::AppState,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::from_env()?;
    init_tracing(config.log_format);

    let state = AppState::open(&config.data_dir, config.app_id)?;
    tracing::info!(data_dir = %config.data_dir.display(), "Ledger opened");

    let shutdown = CancellationToken::new();

    let indexer_handle = match config.indexer() {
        Some(indexer_config) => {
            let client = AlgodClient::new(config.node_url.as_str(), config.node_token.as_deref())?;
            let indexer = RoundIndexer::new(
                client,
                state.ledger.clone(),
                state.registry.clone(),
                indexer_config,
            );
            Some(tokio::spawn(indexer.run(shutdown.clone())))
        }
        None => {
            tracing::warn!("ALGORAND_APP_ID not set; round indexer disabled");
            None
        }
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Listening (docs at /docs)");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = indexer_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Indexer task failed");
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
