// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fitness Soul session service
//!
//! Owns sign-in state and onboarding completion for the UI shell and answers
//! route admission questions over a localhost API.

use fitness_soul::{
    config::Config,
    db::FirestoreDb,
    services::{BroadcastNotifier, FirebaseIdentityProvider, JsonFileCache},
    session::SessionStore,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Notifications buffered per event stream before slow listeners lose them.
const NOTIFICATION_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        project = %config.gcp_project_id,
        "Starting Fitness Soul session service"
    );

    // Authoritative profile store
    let db = FirestoreDb::new(
        &config.gcp_project_id,
        config.firestore_emulator_host.as_deref(),
    )
    .await?;

    let identity = FirebaseIdentityProvider::new(&config)?;

    let cache = JsonFileCache::open(&config.local_cache_path);
    tracing::info!(path = %cache.path().display(), "Local profile cache opened");

    let notifications = Arc::new(BroadcastNotifier::new(NOTIFICATION_CAPACITY));

    let store = SessionStore::new(
        Arc::new(identity),
        Arc::new(db),
        Arc::new(cache),
        notifications.clone(),
    );

    // Feed provider sign-in state into the store for the life of the process
    let _identity_listener = store.spawn_identity_listener();

    let state = Arc::new(AppState::new(config.clone(), store, notifications));
    let app = fitness_soul::routes::create_router(state);

    // The UI shell runs on the same machine
    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), tracing_subscriber::filter::ParseError> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fitness_soul=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();

    Ok(())
}
