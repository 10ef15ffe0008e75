// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{AuthenticatedUser, UserAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Response for GET /v1/users/me
#[derive(Debug, Serialize, ToSchema)]
pub struct UserMeResponse {
    /// Lower-cased email address
    pub user_id: String,
    /// Token record backing the current session
    pub token_id: u64,
    /// Access token expiration (Unix timestamp)
    pub expires_at: i64,
    /// Last successful login, if the account exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<i64>,
}

impl From<AuthenticatedUser> for UserMeResponse {
    fn from(user: AuthenticatedUser) -> Self {
        Self {
            user_id: user.user_id,
            token_id: user.token_id,
            expires_at: user.expires_at,
            last_login: None,
        }
    }
}

/// Get the current authenticated user's information.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Missing access token"),
        (status = 403, description = "Invalid or expired access token"),
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    UserAuth(user): UserAuth,
) -> Result<Json<UserMeResponse>, ApiError> {
    let last_login = state.store.get_user(&user.user_id)?.and_then(|u| u.last_login);
    let mut response = UserMeResponse::from(user);
    response.last_login = last_login;
    Ok(Json(response))
}
