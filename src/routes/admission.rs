// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route admission queries from the UI shell.

use crate::admission::Decision;
use crate::error::{AppError, Result};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/admission", get(evaluate))
}

#[derive(Deserialize)]
struct AdmissionQuery {
    path: Option<String>,
}

/// Decision for a navigation attempt, with the redirect target resolved.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AdmissionResponse {
    pub path: String,
    #[serde(flatten)]
    pub decision: Decision,
    pub location: Option<String>,
}

async fn evaluate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdmissionQuery>,
) -> Result<Json<AdmissionResponse>> {
    let path = params
        .path
        .filter(|p| p.starts_with('/'))
        .ok_or_else(|| AppError::BadRequest("path must be an absolute path".to_string()))?;

    let decision = state.admission.evaluate(&path);

    Ok(Json(AdmissionResponse {
        location: decision.location(),
        decision,
        path,
    }))
}
