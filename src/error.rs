// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::session::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
///
/// Session errors have already been notified by the store; converting them
/// here only picks a status code.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn session_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::Unauthenticated | SessionError::InvalidCredentials => {
            StatusCode::UNAUTHORIZED
        }
        SessionError::AccountExists => StatusCode::CONFLICT,
        SessionError::AccountDisabled => StatusCode::FORBIDDEN,
        SessionError::WeakCredential
        | SessionError::PopupDismissed
        | SessionError::InvalidProfile(_) => StatusCode::BAD_REQUEST,
        SessionError::NetworkUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        SessionError::ProfileFetchFailed | SessionError::ProfileWriteFailed => {
            StatusCode::BAD_GATEWAY
        }
        SessionError::Unknown { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found".to_string(), Some(msg.clone())),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "bad_request".to_string(),
                Some(msg.clone()),
            ),
            AppError::Session(err) => {
                let details = match err {
                    SessionError::InvalidProfile(reason) => reason.clone(),
                    other => other.user_message().to_string(),
                };
                (session_status(err), err.code().to_string(), Some(details))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse { error, details };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
