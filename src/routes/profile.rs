// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Onboarding profile routes for the signed-in user.

use crate::error::Result;
use crate::gate::is_profile_completed;
use crate::models::{ProfileInput, ProfileRecord};
use crate::session::{SessionError, SessionSnapshot};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/profile", get(get_profile).put(save_profile))
        .route("/api/profile/refresh", post(refresh_profile))
        .route("/api/profile/local", delete(forget_local_profile))
}

/// Profile of the signed-in user with its gate status.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileResponse {
    pub profile: Option<ProfileRecord>,
    pub completed: bool,
    pub loading: bool,
}

impl ProfileResponse {
    fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self {
            profile: snapshot.profile.clone(),
            completed: is_profile_completed(snapshot),
            loading: snapshot.profile_loading,
        }
    }
}

async fn get_profile(State(state): State<Arc<AppState>>) -> Result<Json<ProfileResponse>> {
    let snapshot = state.store.snapshot();
    if !snapshot.is_signed_in() {
        return Err(SessionError::Unauthenticated.into());
    }

    Ok(Json(ProfileResponse::from_snapshot(&snapshot)))
}

/// Submit the onboarding form.
async fn save_profile(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ProfileInput>,
) -> Result<Json<ProfileResponse>> {
    let record = state.store.save_profile(input).await?;

    // The store may not have applied the record if the identity changed
    // mid-save; answer with what was written.
    Ok(Json(ProfileResponse {
        completed: record.profile_completed,
        profile: Some(record),
        loading: false,
    }))
}

/// Re-read the profile from the authoritative store.
async fn refresh_profile(State(state): State<Arc<AppState>>) -> Result<Json<ProfileResponse>> {
    let uid = state
        .store
        .snapshot()
        .uid()
        .map(str::to_string)
        .ok_or(SessionError::Unauthenticated)?;

    state.store.fetch_profile(&uid).await?;

    Ok(Json(ProfileResponse::from_snapshot(&state.store.snapshot())))
}

async fn forget_local_profile(State(state): State<Arc<AppState>>) -> Result<StatusCode> {
    state.store.forget_local_profile()?;
    Ok(StatusCode::NO_CONTENT)
}
