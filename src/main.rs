// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stride-Rank API Server
//!
//! Serves the read API and the scheduler/ingest task routes of the
//! performance ranking and streak engine.

use std::sync::Arc;
use stride_rank::{
    config::{Config, StoreBackend},
    db::{ActivitySource, FirestoreDb, MemoryStore, SnapshotStore},
    services::{ScoringConfig, WeightedScoring},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        backend = ?config.store_backend,
        "Starting Stride-Rank API"
    );

    // Select storage backend
    let (source, store): (Arc<dyn ActivitySource>, Arc<dyn SnapshotStore>) =
        match config.store_backend {
            StoreBackend::Firestore => {
                let db = Arc::new(
                    FirestoreDb::new(&config.gcp_project_id)
                        .await
                        .expect("Failed to connect to Firestore"),
                );
                let source: Arc<dyn ActivitySource> = db.clone();
                let store: Arc<dyn SnapshotStore> = db;
                (source, store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; data is lost on restart");
                let memory = Arc::new(MemoryStore::new());
                let source: Arc<dyn ActivitySource> = memory.clone();
                let store: Arc<dyn SnapshotStore> = memory;
                (source, store)
            }
        };

    // Load scoring weights
    let scoring_config = match &config.scoring_config_path {
        Some(path) => {
            tracing::info!(path = %path, "Loading scoring config");
            ScoringConfig::load_from_file(path).expect("Failed to load scoring config")
        }
        None => ScoringConfig::default(),
    };
    let scoring = Arc::new(WeightedScoring::new(scoring_config));

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), source, store, scoring));

    // Build router
    let app = stride_rank::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stride_rank=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
