// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Node startup — assembles the store, model, catalogs, and session map,
//! then serves the HTTP surface.
//!
//! # Startup sequence
//!
//! [`run`] performs these steps in order:
//!
//! 1. Load and validate the tool catalogs (fatal on malformed files).
//! 2. Open the configured store backend (memory or SQLite).
//! 3. Build the model provider (fatal when credentials are missing).
//! 4. Construct the [`SessionMap`] and the responsible-AI gate.
//! 5. Start the axum server (blocks until shutdown).

use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use otto_config::Config;
use otto_store::{MemoryStore, SqliteStore, Store};
use otto_team::SessionMap;

use crate::{rai::RaiGate, routes, routes::AppState};

/// Start the node.  This is the single entry point for `otto serve`.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let catalogs = otto_tools::load_catalogs(config.orchestrator.catalog_dir.as_deref())
        .context("loading tool catalogs")?;
    info!(specialists = catalogs.len(), "tool catalogs loaded");

    let store: Arc<dyn Store> = match config.store.backend.as_str() {
        "memory" => Arc::new(MemoryStore::new()),
        "sqlite" => {
            let path = config
                .store
                .path
                .clone()
                .unwrap_or_else(|| "otto.db".into());
            Arc::new(SqliteStore::open(&path).context("opening sqlite store")?)
        }
        other => anyhow::bail!("unknown store backend: {other}"),
    };

    let model = otto_model::from_config(&config.model).context("building model provider")?;
    info!(
        provider = model.name(),
        model = model.model_name(),
        "model provider ready"
    );

    let sessions = Arc::new(SessionMap::new(
        store,
        Arc::clone(&model),
        Arc::new(catalogs),
        config.orchestrator.clone(),
    ));
    let rai = Arc::new(RaiGate::new(model, config.rai.enabled));

    let state = AppState {
        sessions,
        rai,
        principal_header: config.server.principal_header.clone(),
    };

    let cors = match &config.server.frontend_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .context("invalid frontend origin")?,
            )
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let app = routes::router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "otto node listening");
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
