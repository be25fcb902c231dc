// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Study Hub API Server
//!
//! Serves one gated session over a shared, live assignment list stored in
//! Firestore.

use std::sync::Arc;
use study_hub::{
    app::{spawn_identity_watcher, StudyHub},
    config::{Config, StoreBackend},
    db::{AssignmentStore, FirestoreDb, MemoryStore},
    gate::AccessGate,
    services::{GoogleSignIn, IdentityProvider},
    session::{FileKeyValueStore, KeyValueStore},
    AppState,
};
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, backend = ?config.store_backend, "Starting Study Hub API");

    // Local session flags and the signed-in identity
    let session_store = FileKeyValueStore::open(&config.session_file)?;
    tracing::info!(path = %session_store.path().display(), "Session store opened");
    let kv: Arc<dyn KeyValueStore> = Arc::new(session_store);

    let store: Arc<dyn AssignmentStore> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; assignments will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let identity: Arc<dyn IdentityProvider> = Arc::new(GoogleSignIn::new(&config, kv.clone())?);
    let gate = AccessGate::restore(kv, config.access_secret.clone())?;
    tracing::info!(state = ?gate.state(), "Access gate restored");

    let mut hub = StudyHub::new(gate, identity.clone(), store);
    if let Err(e) = hub.start().await {
        tracing::warn!(error = %e, "Failed to apply restored session");
    }

    let hub = Arc::new(Mutex::new(hub));
    let watcher = spawn_identity_watcher(hub.clone(), identity);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        hub: hub.clone(),
    });

    // Build router
    let app = study_hub::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    watcher.abort();
    hub.lock().await.teardown();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,study_hub=debug"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
