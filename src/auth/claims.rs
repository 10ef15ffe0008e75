// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated identity representations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Claims carried by a device bearer token.
///
/// Devices mint these themselves with their provisioned key, so only the
/// identity pair is mandatory. `exp` is enforced when the device sets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClaims {
    pub device_id: String,
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Which half of a session pair a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by user session tokens (both access and refresh).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// Lower-cased user email
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Token record shared by both tokens of the pair
    pub tid: u64,
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Device identity established by the device auth gate.
///
/// Only constructed after the bearer token's signature has been verified
/// against the device's own key, so holding one is proof of authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct AuthenticatedDevice {
    pub device_id: String,
    pub org_id: String,
    /// Path parameters of the matched route (e.g. `org_id`)
    pub route_params: HashMap<String, String>,
}

impl AuthenticatedDevice {
    /// Build from verified claims and the route's path parameters.
    pub(crate) fn from_claims(claims: DeviceClaims, route_params: HashMap<String, String>) -> Self {
        Self {
            device_id: claims.device_id,
            org_id: claims.org_id,
            route_params,
        }
    }
}

/// User identity established from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Canonical user ID (lower-cased email)
    pub user_id: String,

    /// Token record backing this session
    pub token_id: u64,

    /// Token expiration (Unix timestamp)
    pub expires_at: i64,
}

impl AuthenticatedUser {
    /// Create from verified access-token claims.
    pub(crate) fn from_claims(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            token_id: claims.tid,
            expires_at: claims.exp,
        }
    }
}
