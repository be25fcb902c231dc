// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Identity provider rejected or interrupted the sign-in.
    #[error("Google sign-in failed: {0}")]
    SignInFailed(String),

    #[error("Sign in with Google first")]
    NotSignedIn,

    #[error("Incorrect password")]
    IncorrectSecret,

    #[error("Access requires sign-in and the access password")]
    NotAdmitted,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Local durable key-value storage failed.
    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message shown to the user when Google sign-in fails.
    pub const SIGN_IN_FAILED_MESSAGE: &'static str = "Google sign-in failed.";

    /// Message shown to the user when the access password does not match.
    pub const INCORRECT_SECRET_MESSAGE: &'static str = "Incorrect password.";

    /// The message a user sees for this error on the login screens.
    ///
    /// Sign-in failures never leak the underlying cause here.
    pub fn user_message(&self) -> String {
        match self {
            AppError::SignInFailed(_) => Self::SIGN_IN_FAILED_MESSAGE.to_string(),
            AppError::IncorrectSecret => Self::INCORRECT_SECRET_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::SignInFailed(msg) => {
                tracing::warn!(error = %msg, "Sign-in failed");
                (
                    StatusCode::UNAUTHORIZED,
                    "sign_in_failed",
                    Some(self.user_message()),
                )
            }
            AppError::NotSignedIn => (StatusCode::UNAUTHORIZED, "not_signed_in", None),
            AppError::IncorrectSecret => (
                StatusCode::UNAUTHORIZED,
                "incorrect_secret",
                Some(self.user_message()),
            ),
            AppError::NotAdmitted => (StatusCode::FORBIDDEN, "not_admitted", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::BAD_GATEWAY, "database_error", None)
            }
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Local storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
