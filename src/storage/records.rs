// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rows persisted in the credential store.
//!
//! All timestamps are Unix seconds, matching what the device firmware and
//! the token claims carry.

use serde::{Deserialize, Serialize};

/// Base64-encoded device secret as kept at rest.
///
/// `Debug` is redacted so a device record can be logged without leaking
/// the key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    /// Wrap an already-encoded key.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Encode raw key bytes for storage.
    pub fn from_bytes(raw: &[u8]) -> Self {
        use base64ct::{Base64, Encoding};
        Self(Base64::encode_string(raw))
    }

    /// The encoded form.
    pub fn encoded(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeviceKey(<redacted>)")
    }
}

/// A provisioned device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub org_id: String,
    pub device_key: DeviceKey,
    pub created_at: i64,
    /// Unset while the device has not joined the waiting room.
    #[serde(default)]
    pub joined_at: Option<i64>,
    #[serde(default)]
    pub last_seen: Option<i64>,
    /// Assigned out-of-band once an operator picks a profile.
    #[serde(default)]
    pub profile_url: Option<String>,
}

/// Key-less projection of a device used for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceListing {
    pub device_id: String,
    pub created_at: i64,
    pub joined_at: Option<i64>,
    pub last_seen: Option<i64>,
    pub profile_url: Option<String>,
}

impl From<DeviceRecord> for DeviceListing {
    fn from(record: DeviceRecord) -> Self {
        Self {
            device_id: record.device_id,
            created_at: record.created_at,
            joined_at: record.joined_at,
            last_seen: record.last_seen,
            profile_url: record.profile_url,
        }
    }
}

/// A user account. `user_id` is always the lower-cased email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub created_at: i64,
    #[serde(default)]
    pub last_login: Option<i64>,
}

/// One refresh-token generation.
///
/// Both tokens of an issued pair reference the same record. Deleting the
/// record, or letting `expires_at` pass, revokes the refresh token no matter
/// what its embedded claims say.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedTokenRecord {
    pub token_id: u64,
    pub user_id: String,
    pub created_at: i64,
    /// Expiry of the refresh token, not the access token.
    pub expires_at: i64,
}

impl IssuedTokenRecord {
    /// Whether the record has lapsed at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at < now
    }
}
