// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! `Display` carries the detailed reason and is meant for logs only. The
//! HTTP body is built from [`AuthError::public_message`], which collapses
//! every credential failure into one indistinguishable answer so callers
//! cannot probe which devices or users exist.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StoreError;

/// Authentication error type.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credential presented
    #[error("no credential presented")]
    Unauthenticated,
    /// Credential present but invalid, expired or revoked
    #[error("credential rejected: {0}")]
    Unauthorized(&'static str),
    /// Token failed structural, algorithm or signature checks
    #[error("token is invalid")]
    InvalidToken,
    /// No device matches the claimed identity
    #[error("device not found")]
    DeviceNotFound,
    /// No user matches the claimed identity
    #[error("user not found")]
    UserNotFound,
    /// Unexpected store failure or affected-row count
    #[error("storage error: {0}")]
    Storage(String),
    /// Key or encoding failure while creating a token
    #[error("signing error: {0}")]
    Signing(String),
    /// Identity provider call failed or timed out
    #[error("identity provider unavailable: {0}")]
    UpstreamUnavailable(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Storage(e.to_string())
    }
}

impl AuthError {
    /// Get the error code exposed to callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::Unauthorized(_)
            | AuthError::InvalidToken
            | AuthError::DeviceNotFound
            | AuthError::UserNotFound => "unauthorized",
            AuthError::Storage(_) | AuthError::Signing(_) => "internal_error",
            AuthError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Unauthorized(_)
            | AuthError::InvalidToken
            | AuthError::DeviceNotFound
            | AuthError::UserNotFound => StatusCode::FORBIDDEN,
            AuthError::Storage(_) | AuthError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "Authorization header is required",
            AuthError::Unauthorized(_)
            | AuthError::InvalidToken
            | AuthError::DeviceNotFound
            | AuthError::UserNotFound => "invalid credentials",
            AuthError::Storage(_) | AuthError::Signing(_) => "internal error",
            AuthError::UpstreamUnavailable(_) => "identity provider unavailable",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Authentication failed with server-side fault");
        } else {
            tracing::debug!(error = %self, "Authentication rejected");
        }

        let body = Json(AuthErrorBody {
            error: self.public_message().to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
