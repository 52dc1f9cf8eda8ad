// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session routes: sign-in, sign-up, sign-out and the live session stream.

use crate::error::{AppError, Result};
use crate::models::Identity;
use crate::services::notifier::{Notification, Notifier};
use crate::services::FederatedCredential;
use crate::session::{SessionSnapshot, Subscription};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const MISSING_FIELDS_MESSAGE: &str = "Please fill out all required fields";
const PASSWORD_MISMATCH_MESSAGE: &str = "Passwords do not match.";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/session/events", get(session_events))
        .route("/api/session/login", post(login))
        .route("/api/session/signup", post(signup))
        .route("/api/session/federated", post(federated_sign_in))
        .route("/api/session/logout", post(logout))
        .route("/api/session/display-name", put(update_display_name))
}

// ─── Snapshot ────────────────────────────────────────────────

/// Current session snapshot.
async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.store.snapshot().as_ref().clone())
}

// ─── Credentials ─────────────────────────────────────────────

#[derive(Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct SignupRequest {
    email: String,
    password: String,
    confirm_password: String,
}

#[derive(Deserialize)]
struct DisplayNameRequest {
    display_name: String,
}

/// Reject blank form fields before anything reaches the identity provider.
fn require_fields(state: &AppState, fields: &[&str]) -> Result<()> {
    if fields.iter().any(|field| field.trim().is_empty()) {
        state
            .notifications
            .notify(Notification::error(MISSING_FIELDS_MESSAGE));
        return Err(AppError::BadRequest(MISSING_FIELDS_MESSAGE.to_string()));
    }
    Ok(())
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<Identity>> {
    require_fields(&state, &[&req.email, &req.password])?;

    let identity = state.store.login(req.email.trim(), &req.password).await?;
    Ok(Json(identity))
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<Identity>> {
    require_fields(&state, &[&req.email, &req.password, &req.confirm_password])?;

    if req.password != req.confirm_password {
        state
            .notifications
            .notify(Notification::error(PASSWORD_MISMATCH_MESSAGE));
        return Err(AppError::BadRequest(PASSWORD_MISMATCH_MESSAGE.to_string()));
    }

    let identity = state.store.signup(req.email.trim(), &req.password).await?;
    Ok(Json(identity))
}

/// Complete a federated sign-in with the credential from the provider popup.
async fn federated_sign_in(
    State(state): State<Arc<AppState>>,
    Json(credential): Json<FederatedCredential>,
) -> Result<Json<Identity>> {
    let identity = state.store.federated_sign_in(credential).await?;
    Ok(Json(identity))
}

async fn logout(State(state): State<Arc<AppState>>) -> Result<StatusCode> {
    state.store.sign_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_display_name(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DisplayNameRequest>,
) -> Result<Json<Identity>> {
    let identity = state.store.update_display_name(&req.display_name).await?;
    Ok(Json(identity))
}

// ─── Event Stream ────────────────────────────────────────────

/// Per-connection resources, released when the client disconnects.
struct EventFeed {
    events: mpsc::UnboundedReceiver<Event>,
    _subscription: Subscription,
    notifications: JoinHandle<()>,
}

impl Drop for EventFeed {
    fn drop(&mut self) {
        self.notifications.abort();
    }
}

fn snapshot_event(snapshot: &SessionSnapshot) -> Event {
    Event::default()
        .event("session")
        .json_data(snapshot)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to encode session event");
            Event::default().event("session").data("{}")
        })
}

fn notification_event(notification: &Notification) -> Event {
    Event::default()
        .event("notification")
        .json_data(notification)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to encode notification event");
            Event::default().event("notification").data("{}")
        })
}

/// Server-sent events: the current snapshot, then every published snapshot
/// (`session`) interleaved with user notifications (`notification`).
async fn session_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (tx, events) = mpsc::unbounded_channel();

    let session_tx = tx.clone();
    let subscription = state.store.observe(move |snapshot| {
        let _ = session_tx.send(snapshot_event(snapshot));
    });

    let mut receiver = state.notifications.subscribe();
    let notifications = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(notification) => {
                    if tx.send(notification_event(&notification)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagging, notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tracing::debug!("Session event stream opened");

    let feed = EventFeed {
        events,
        _subscription: subscription,
        notifications,
    };

    let stream = stream::unfold(feed, |mut feed| async move {
        feed.events
            .recv()
            .await
            .map(|event| (Ok::<_, Infallible>(event), feed))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
