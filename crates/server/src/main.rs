//! fairshare: WebSocket job dispatcher with fair-share admission.
//!
//! Clients connect on `ws://host:port/{channel}`, submit jobs, and receive
//! dispatched jobs for that channel. At most `maximum` jobs run at once;
//! owners and projects with fewer running jobs are served first.
//!
//! # Usage
//!
//! ```bash
//! # Flags only
//! fairshare --host 0.0.0.0 --port 8023 --maximum 4
//!
//! # Config file plus environment overrides
//! FAIRSHARE_MAXIMUM=8 fairshare --config fairshare.toml
//! ```

mod api;
mod channels;
mod cli;
mod live;
mod protocol;
mod router;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fairshare_core::FairshareConfig;
use fairshare_queue::{Dispatcher, Scheduler};

use crate::channels::ChannelRouter;
use crate::cli::Cli;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so its values are visible to clap's env fallbacks.
    fairshare_core::load_dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    let config = cli.load_config()?;
    config.log_summary();

    serve(config).await
}

async fn serve(config: FairshareConfig) -> anyhow::Result<()> {
    let backend = fairshare_queue::connect(&config.storage)
        .await
        .with_context(|| format!("failed to open {} storage backend", config.storage.kind.name()))?;

    let scheduler = Arc::new(Scheduler::from_config(backend, &config.scheduler));
    let channels = Arc::new(ChannelRouter::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = Dispatcher::from_config(scheduler.clone(), channels.clone(), &config.scheduler);
    let dispatcher_handle = tokio::spawn(dispatcher.run(shutdown_rx));

    let state = Arc::new(AppState {
        scheduler,
        channels,
        reply_acks: config.server.reply_acks,
    });
    let app = router::build_router(state);

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on ws://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    dispatcher_handle.await.context("dispatcher task panicked")?;
    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
