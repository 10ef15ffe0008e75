// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated devices and users.
//!
//! ```rust,ignore
//! async fn poll(DeviceAuth(device): DeviceAuth) -> impl IntoResponse {
//!     // device is AuthenticatedDevice
//! }
//!
//! async fn me(UserAuth(user): UserAuth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use std::collections::HashMap;

use axum::{
    extract::{rejection::PathRejection, FromRequestParts, Path},
    http::{header::AUTHORIZATION, request::Parts},
};

use super::claims::{AuthenticatedDevice, DeviceClaims};
use super::codec::TokenCodec;
use super::resolver::DeviceKeyResolver;
use super::{AuthError, AuthenticatedUser};
use crate::state::AppState;

/// Path parameter checked against the token's organization.
const ORG_ID_PARAM: &str = "org_id";

/// Read the credential from the Authorization header.
///
/// Accepts `Bearer <jwt>` as well as a bare `<jwt>`, which is what device
/// firmware sends.
fn credential(parts: &Parts) -> Result<&str, AuthError> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::Unauthenticated)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken)?
        .trim();

    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        return Err(AuthError::Unauthenticated);
    }
    Ok(token)
}

/// Extractor for devices authenticated with their provisioned key.
///
/// The token is HS512-signed by the device itself. Verification looks the
/// device key up by the token's unverified `(device_id, org_id)` and then
/// checks the signature. An unknown device and a bad signature are rejected
/// identically. When the route has an `org_id` path parameter it must match
/// the token's organization.
///
/// Never writes to the store.
pub struct DeviceAuth(pub AuthenticatedDevice);

impl FromRequestParts<AppState> for DeviceAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = credential(parts)?;

        let resolver = DeviceKeyResolver::new(&state.store);
        let claims: DeviceClaims = TokenCodec::device().parse(token, &resolver)?;

        let route_params = match Path::<HashMap<String, String>>::from_request_parts(parts, state).await {
            Ok(Path(params)) => params,
            // Route has no path parameters
            Err(PathRejection::MissingPathParams(_)) => HashMap::new(),
            Err(rejection) => {
                tracing::info!(
                    device_id = %claims.device_id,
                    error = %rejection.body_text(),
                    "Device request with undecodable path parameters"
                );
                return Err(AuthError::Unauthorized("organization mismatch"));
            }
        };

        if let Some(path_org) = route_params.get(ORG_ID_PARAM) {
            if *path_org != claims.org_id {
                tracing::info!(
                    device_id = %claims.device_id,
                    token_org = %claims.org_id,
                    path_org = %path_org,
                    "Device token presented for another organization"
                );
                return Err(AuthError::Unauthorized("organization mismatch"));
            }
        }

        Ok(DeviceAuth(AuthenticatedDevice::from_claims(claims, route_params)))
    }
}

/// Extractor for users holding a valid session access token.
///
/// Access tokens are verified statelessly: signature, expiry and
/// `type == access`. Revocation applies to refresh tokens only.
pub struct UserAuth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for UserAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = credential(parts)?;
        let user = state.sessions.verify_access(token)?;
        Ok(UserAuth(user))
    }
}
