// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Device waiting room.
//!
//! A provisioned device moves through three states, derived from its record:
//!
//! | State | `joined_at` | `profile_url` |
//! |-------|-------------|---------------|
//! | `Unclaimed` | unset | unset |
//! | `Joined` | set | unset |
//! | `Profiled` | any | set |
//!
//! Devices join and poll for themselves. Profile assignment happens
//! out-of-band through [`CredentialStore::assign_device_profile`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthenticatedDevice;
use crate::storage::{CredentialStore, DeviceListing, StoreError};

/// Where a device stands in onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingState {
    Unclaimed,
    Joined,
    Profiled,
}

impl OnboardingState {
    pub fn of(joined_at: Option<i64>, profile_url: Option<&str>) -> Self {
        match (joined_at, profile_url) {
            (_, Some(_)) => OnboardingState::Profiled,
            (Some(_), None) => OnboardingState::Joined,
            (None, None) => OnboardingState::Unclaimed,
        }
    }
}

/// Result of a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// The device had already joined; `joined_at` was refreshed.
    AlreadyJoined,
}

/// Which devices a waiting-room listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitingFilter {
    #[default]
    All,
    /// Only devices without an assigned profile
    Unprofiled,
}

/// A device as shown in the waiting room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WaitingDevice {
    pub device_id: String,
    pub created_at: i64,
    pub joined_at: Option<i64>,
    pub last_seen: Option<i64>,
    pub profile_url: Option<String>,
    pub state: OnboardingState,
}

impl From<DeviceListing> for WaitingDevice {
    fn from(listing: DeviceListing) -> Self {
        let state = OnboardingState::of(listing.joined_at, listing.profile_url.as_deref());
        Self {
            device_id: listing.device_id,
            created_at: listing.created_at,
            joined_at: listing.joined_at,
            last_seen: listing.last_seen,
            profile_url: listing.profile_url,
            state,
        }
    }
}

/// Onboarding errors.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    /// Update matched no device
    #[error("device not found")]
    NotFound,
    /// Update matched more than one device
    #[error("update affected {rows} devices")]
    Conflict { rows: u64 },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Serialize)]
struct OnboardingErrorBody {
    error: String,
}

impl IntoResponse for OnboardingError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            OnboardingError::NotFound => (StatusCode::NOT_FOUND, "device not found"),
            OnboardingError::Conflict { .. } => (StatusCode::CONFLICT, "device record conflict"),
            OnboardingError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Onboarding operation failed");
        } else {
            tracing::info!(error = %self, "Onboarding operation rejected");
        }
        (status, Json(OnboardingErrorBody { error: message.to_string() })).into_response()
    }
}

fn expect_single_row(rows: u64) -> Result<(), OnboardingError> {
    match rows {
        1 => Ok(()),
        0 => Err(OnboardingError::NotFound),
        rows => Err(OnboardingError::Conflict { rows }),
    }
}

/// Waiting-room operations over the credential store.
pub struct Onboarding<'a> {
    store: &'a CredentialStore,
}

impl<'a> Onboarding<'a> {
    pub fn new(store: &'a CredentialStore) -> Self {
        Self { store }
    }

    /// Record that an authenticated device entered the waiting room.
    pub fn mark_joined(&self, device: &AuthenticatedDevice) -> Result<JoinOutcome, OnboardingError> {
        let (rows, previous) = self
            .store
            .update_device_joined(&device.device_id, &device.org_id, Utc::now().timestamp())?;
        expect_single_row(rows)?;

        let outcome = if previous.is_some() {
            JoinOutcome::AlreadyJoined
        } else {
            JoinOutcome::Joined
        };
        tracing::info!(device_id = %device.device_id, org_id = %device.org_id, ?outcome, "Device joined waiting room");
        Ok(outcome)
    }

    /// Return the device's profile URL, if assigned, and stamp `last_seen`.
    ///
    /// The poll fails unless the `last_seen` update hits exactly one row,
    /// whatever the read returned.
    pub fn poll_profile(&self, device: &AuthenticatedDevice) -> Result<Option<String>, OnboardingError> {
        let profile = self
            .store
            .read_device_profile(&device.device_id, &device.org_id)?
            .flatten();

        let rows = self
            .store
            .update_device_last_seen(&device.device_id, &device.org_id, Utc::now().timestamp())?;
        expect_single_row(rows)?;

        tracing::debug!(device_id = %device.device_id, assigned = profile.is_some(), "Device polled for profile");
        Ok(profile)
    }

    /// List the devices of one organization.
    pub fn list_waiting(&self, org_id: &str, filter: WaitingFilter) -> Result<Vec<WaitingDevice>, OnboardingError> {
        let devices = self
            .store
            .list_devices(org_id)?
            .into_iter()
            .filter(|listing| match filter {
                WaitingFilter::All => true,
                WaitingFilter::Unprofiled => listing.profile_url.is_none(),
            })
            .map(WaitingDevice::from)
            .collect();
        Ok(devices)
    }
}
