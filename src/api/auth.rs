// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User login, session token and account endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{AuthError, RefreshValidator, TokenPair};
use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for the OAuth callback.
#[derive(Debug, Deserialize, IntoParams)]
pub struct LoginQuery {
    /// OAuth authorization code.
    pub code: String,
}

/// Body for refresh and revoke requests.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Body (or query string) for account creation.
#[derive(Debug, Serialize, Deserialize, ToSchema, IntoParams)]
pub struct CreateAccountRequest {
    pub email: String,
}

/// Response for account creation.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateAccountResponse {
    /// Lower-cased email the account is keyed by.
    pub user_id: String,
}

/// Loose shape check: one `@` with something on both sides.
fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Exchange an OAuth code for a session token pair.
#[utoipa::path(
    get,
    path = "/v1/device/auth/token",
    tag = "Auth",
    params(LoginQuery),
    responses(
        (status = 200, description = "Session tokens issued", body = TokenPair),
        (status = 400, description = "Missing code"),
        (status = 403, description = "No account for this identity"),
        (status = 502, description = "Identity provider unavailable")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Json<TokenPair>, AuthError> {
    let provider = state
        .identity
        .as_ref()
        .ok_or_else(|| AuthError::UpstreamUnavailable("OAuth login is not configured".to_string()))?;

    let email = provider.primary_email(&query.code).await?;

    let rows = state.store.update_user_last_login(&email, Utc::now().timestamp())?;
    if rows != 1 {
        tracing::info!(rows, "Login for identity without an account");
        return Err(AuthError::UserNotFound);
    }

    let pair = state.sessions.issue(&email)?;
    tracing::info!("User logged in");
    Ok(Json(pair))
}

/// Rotate a refresh token into a new pair.
#[utoipa::path(
    post,
    path = "/v1/device/auth/token/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New session tokens", body = TokenPair),
        (status = 403, description = "Refresh token invalid, expired or revoked")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    let pair = RefreshValidator::new(&state.sessions).refresh(&request.refresh_token)?;
    Ok(Json(pair))
}

/// Revoke a refresh token (logout).
#[utoipa::path(
    post,
    path = "/v1/device/auth/token/revoke",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Refresh token revoked"),
        (status = 403, description = "Refresh token invalid, expired or already revoked")
    )
)]
pub async fn revoke(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<StatusCode, AuthError> {
    RefreshValidator::new(&state.sessions).revoke(&request.refresh_token)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create a user account.
#[utoipa::path(
    post,
    path = "/v1/device/auth/join",
    tag = "Auth",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = CreateAccountResponse),
        (status = 400, description = "Invalid email or account already exists")
    )
)]
pub async fn join(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<CreateAccountResponse>), ApiError> {
    create_account(&state, &request.email)
}

/// Create a user account from `?email=`, as older clients send it.
#[utoipa::path(
    get,
    path = "/v1/device/auth/join",
    tag = "Auth",
    params(CreateAccountRequest),
    responses(
        (status = 201, description = "Account created", body = CreateAccountResponse),
        (status = 400, description = "Invalid email or account already exists")
    )
)]
pub async fn join_by_query(
    State(state): State<AppState>,
    Query(request): Query<CreateAccountRequest>,
) -> Result<(StatusCode, Json<CreateAccountResponse>), ApiError> {
    create_account(&state, &request.email)
}

fn create_account(state: &AppState, email: &str) -> Result<(StatusCode, Json<CreateAccountResponse>), ApiError> {
    let email = email.trim().to_lowercase();
    if !is_plausible_email(&email) {
        return Err(ApiError::bad_request("invalid email address"));
    }

    let rows = state.store.insert_user(&email, Utc::now().timestamp())?;
    if rows != 1 {
        return Err(ApiError::bad_request("account already exists"));
    }

    tracing::info!("User account created");
    Ok((StatusCode::CREATED, Json(CreateAccountResponse { user_id: email })))
}
