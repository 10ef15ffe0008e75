// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Device waiting-room endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{DeviceAuth, UserAuth};
use crate::onboarding::{JoinOutcome, Onboarding, OnboardingError, WaitingDevice, WaitingFilter};
use crate::state::AppState;

/// Query parameters for waiting-room listings.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct WaitingRoomQuery {
    /// Only list devices without an assigned profile.
    #[serde(default)]
    pub unprofiled: bool,
}

impl From<&WaitingRoomQuery> for WaitingFilter {
    fn from(query: &WaitingRoomQuery) -> Self {
        if query.unprofiled {
            WaitingFilter::Unprofiled
        } else {
            WaitingFilter::All
        }
    }
}

/// Response for GET /v1/device/{org_id}/waiting_room
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WaitingRoomResponse {
    pub org_id: String,
    pub devices: Vec<WaitingDevice>,
}

/// Response for POST /v1/device/{org_id}/waiting_room
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JoinResponse {
    pub device_id: String,
    /// False when the device had already joined.
    pub newly_joined: bool,
}

/// Response for GET /v1/device/{org_id}/profile
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    /// Assigned profile, absent while the device is still waiting.
    pub profile_url: Option<String>,
}

/// List the devices of an organization.
#[utoipa::path(
    get,
    path = "/v1/device/{org_id}/waiting_room",
    tag = "Devices",
    security(("bearer_auth" = [])),
    params(
        ("org_id" = String, Path, description = "Organization ID"),
        WaitingRoomQuery
    ),
    responses(
        (status = 200, description = "Devices of the organization", body = WaitingRoomResponse),
        (status = 401, description = "Missing access token"),
        (status = 403, description = "Invalid access token")
    )
)]
pub async fn list_waiting_room(
    UserAuth(user): UserAuth,
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    Query(query): Query<WaitingRoomQuery>,
) -> Result<Json<WaitingRoomResponse>, OnboardingError> {
    let devices = Onboarding::new(&state.store).list_waiting(&org_id, WaitingFilter::from(&query))?;
    tracing::debug!(user_id = %user.user_id, %org_id, count = devices.len(), "Listed waiting room");
    Ok(Json(WaitingRoomResponse { org_id, devices }))
}

/// Enter the waiting room as the calling device.
#[utoipa::path(
    post,
    path = "/v1/device/{org_id}/waiting_room",
    tag = "Devices",
    security(("device_token" = [])),
    params(
        ("org_id" = String, Path, description = "Organization ID")
    ),
    responses(
        (status = 201, description = "Device joined", body = JoinResponse),
        (status = 200, description = "Device had already joined", body = JoinResponse),
        (status = 401, description = "Missing device token"),
        (status = 403, description = "Invalid device token"),
        (status = 404, description = "Device not found"),
        (status = 409, description = "Device record conflict")
    )
)]
pub async fn join_waiting_room(
    DeviceAuth(device): DeviceAuth,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<JoinResponse>), OnboardingError> {
    let outcome = Onboarding::new(&state.store).mark_joined(&device)?;
    let status = match outcome {
        JoinOutcome::Joined => StatusCode::CREATED,
        JoinOutcome::AlreadyJoined => StatusCode::OK,
    };
    Ok((
        status,
        Json(JoinResponse {
            device_id: device.device_id,
            newly_joined: outcome == JoinOutcome::Joined,
        }),
    ))
}

/// Poll for the calling device's assigned profile.
#[utoipa::path(
    get,
    path = "/v1/device/{org_id}/profile",
    tag = "Devices",
    security(("device_token" = [])),
    params(
        ("org_id" = String, Path, description = "Organization ID")
    ),
    responses(
        (status = 200, description = "Profile assignment status", body = ProfileResponse),
        (status = 401, description = "Missing device token"),
        (status = 403, description = "Invalid device token"),
        (status = 404, description = "Device not found")
    )
)]
pub async fn poll_profile(
    DeviceAuth(device): DeviceAuth,
    State(state): State<AppState>,
) -> Result<Json<ProfileResponse>, OnboardingError> {
    let profile_url = Onboarding::new(&state.store).poll_profile(&device)?;
    Ok(Json(ProfileResponse { profile_url }))
}
