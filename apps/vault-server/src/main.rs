// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{process::ExitCode, sync::Arc};

use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;

use confidential_vault_server::{
    anchor::{AnchorWorker, ChainAnchor},
    api::router,
    blockchain::{ChainClient, VaultContract},
    config::{VaultConfig, DEFAULT_LOG_FILTER},
    fhe::FheEngine,
    ledger::VaultLedger,
    logging::init_logging,
    state::AppState,
    storage::OperationLog,
};

type StartupError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = match VaultConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(DEFAULT_LOG_FILTER, config.log_format);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Confidential vault server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: VaultConfig) -> Result<(), StartupError> {
    tracing::debug!(config = ?config, "Loaded configuration");

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "rustls crypto provider already installed")?;

    let engine = Arc::new(match &config.key_path {
        Some(path) => FheEngine::load_or_generate(path)?,
        None => {
            tracing::warn!("No DATA_DIR or FHE_KEY_PATH; using an ephemeral vault key");
            FheEngine::generate()?
        }
    });
    tracing::info!(
        key_fingerprint = %engine.key_fingerprint(),
        "Encrypted arithmetic engine ready"
    );

    let (ledger, durable) = match config.journal_path() {
        Some(path) => {
            let store = Arc::new(OperationLog::open(&path)?);
            tracing::info!(path = %path.display(), "Opened operation journal");
            (VaultLedger::restore(engine, store).await?, true)
        }
        None => {
            tracing::warn!("No DATA_DIR; ledger state will not survive a restart");
            (VaultLedger::new(engine), false)
        }
    };
    let ledger = Arc::new(ledger);

    let contract = match (config.chain.contract_address, config.private_key.as_deref()) {
        (Some(address), Some(private_key)) => {
            let client = ChainClient::connect(config.chain.clone(), private_key)?;
            client.verify_deployment(address).await?;
            client.log_sender().await;
            VaultContract::onchain(&client, address)
        }
        _ => {
            tracing::info!("No CONTRACT_ADDRESS; anchoring to the simulated contract");
            VaultContract::simulated()
        }
    };
    let anchor = Arc::new(ChainAnchor::new(contract, config.commit.anchor.clone()));

    let shutdown = CancellationToken::new();
    let worker = AnchorWorker::new(ledger.clone(), anchor.clone())
        .with_interval(config.commit.interval)
        .with_batch_size(config.commit.batch_size)
        .with_auto_requeue(config.commit.auto_requeue);
    let worker_task = tokio::spawn(worker.run(shutdown.clone()));

    let app = router(AppState::new(ledger, anchor, durable));
    let addr = config.bind;

    match &config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            tracing::info!(%addr, "Confidential vault listening on https (docs at /docs)");
            tokio::select! {
                served = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()) => served?,
                _ = shutdown_signal() => {}
            }
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!(%addr, "Confidential vault listening on http (docs at /docs)");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    tracing::info!("Shutting down; stopping anchor worker");
    shutdown.cancel();
    worker_task.await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
