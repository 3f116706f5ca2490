//! clinic-scribe-daemon: voice command router for clinical form entry
//!
//! The daemon owns the patient form state and listens on a Unix socket:
//! - a speech source delivers finalized utterances and recognition errors
//! - the router switches fields, toggles dictation, and appends dictated text
//! - UI clients query status, subscribe to pushes, upload recorded clips
//!   for transcription, and submit the form to the clinic backend

mod api;
mod config;
mod events;
mod form;
mod ipc;
mod lifecycle;
mod router;
mod status;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::BackendClient;
use crate::config::Config;
use crate::events::FormEvent;
use crate::form::FormStore;
use crate::ipc::{Server, ServerCtx};
use crate::lifecycle::ShutdownSignal;
use crate::router::{FieldRegistry, Router};
use crate::status::{StatusColor, StatusSink};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "clinic-scribe-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, backend = %config.backend_url, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Create channels for inter-component communication
    // Speech source (via IPC) -> router
    let (utterance_tx, utterance_rx) = mpsc::channel(32);
    // Router and server -> subscribed clients
    let (event_tx, _event_rx) = broadcast::channel::<FormEvent>(64);

    let status = StatusSink::new(64);
    let store = Arc::new(RwLock::new(FormStore::standard()));
    let backend = Arc::new(BackendClient::new(&config.backend_url, config.http_timeout)?);

    // Create the router
    let mut router = Router::new(
        FieldRegistry::standard(),
        Arc::clone(&store),
        status.clone(),
        event_tx.clone(),
        config.startup_delay,
    );
    let listening = router.listening_flag();

    // Create the IPC server; without it the daemon has no speech input but
    // keeps running
    let server = match Server::new(
        &config.socket_path,
        ServerCtx {
            utterance_tx: utterance_tx.clone(),
            store: Arc::clone(&store),
            backend,
            status: status.clone(),
            event_tx: event_tx.clone(),
            listening,
        },
    ) {
        Ok(server) => Some(server),
        Err(e) => {
            error!(?e, "failed to start IPC server");
            warn!("continuing without speech input - no client can reach the daemon");
            status.set("Speech input unavailable.", StatusColor::Red);
            None
        }
    };

    // Keep the router's channel open even if the server went away
    let _utterance_keepalive = utterance_tx;

    // Subscribe to form events for IPC status synchronization
    let mut ipc_event_rx = event_tx.subscribe();
    let server_for_events = server.as_ref();

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the router (processes utterances)
        _ = router.run(utterance_rx) => {
            info!("router exited");
        }

        // Run the IPC server (accepts client connections)
        result = run_server(server.as_ref()) => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Mirror form events into the IPC status snapshot
        _ = async {
            loop {
                match ipc_event_rx.recv().await {
                    Ok(event) => {
                        info!(?event, "form event received");
                        if let Some(server) = server_for_events {
                            server.apply_event(&event).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "form event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("form event handler exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    if let Some(server) = &server {
        server.shutdown().await;
    }

    info!("clinic-scribe-daemon stopped");

    Ok(())
}

/// Drive the IPC server when one exists; otherwise park forever so the
/// select loop stays on the other branches
async fn run_server(server: Option<&Server>) -> Result<()> {
    match server {
        Some(server) => server.run().await,
        None => std::future::pending().await,
    }
}
