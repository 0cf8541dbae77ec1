// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{process::ExitCode, sync::Arc};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use brokebegone_server::{
    api::router,
    auth::HttpIdentityProvider,
    config::AppConfig,
    providers::plaid::PlaidClient,
    state::AppState,
    storage::{ensure_schema, LinkedAccountStore, StoragePaths},
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let paths = StoragePaths::new(&config.data_dir);
    paths.ensure_root()?;
    let store = LinkedAccountStore::open(&paths.database_file())?;
    ensure_schema(&store)?;
    info!(path = %paths.database_file().display(), "Linked-account store ready");

    let provider = PlaidClient::new(&config.plaid, config.provider_timeout)?;
    let identity = HttpIdentityProvider::new(config.identity_base_url.clone(), config.provider_timeout)?;
    info!(
        plaid = %config.plaid.base_url,
        identity = %config.identity_base_url,
        policy = ?config.balances.failure_policy,
        "Providers configured"
    );

    let state = AppState::new(
        store,
        Arc::new(identity),
        Arc::new(provider),
        config.link.clone(),
        config.balances,
    )
    .with_sign_in_path(&config.sign_in_path);
    let app = router(state);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("Broke Be Gone server listening on http://{} (docs at /docs)", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Server shut down");
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received terminate signal, initiating graceful shutdown"),
    }
    shutdown.cancel();
}
