// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification key lookup.
//!
//! The codec hands a resolver the claims of a token whose signature has NOT
//! been checked yet. Looking a key up by claimed identity is not a trust
//! decision; only the signature check that follows establishes trust.

use base64ct::{Base64, Encoding};
use serde_json::{Map, Value};

use super::AuthError;
use crate::storage::CredentialStore;

/// Claims read from a token before its signature is verified.
#[derive(Debug, Clone, Default)]
pub struct UnverifiedClaims(Map<String, Value>);

impl UnverifiedClaims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// A claim that must be a JSON string.
    pub fn str_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }
}

/// Supplies the HMAC key a token must verify against.
pub trait KeyResolver {
    fn resolve(&self, claims: &UnverifiedClaims) -> Result<Vec<u8>, AuthError>;
}

/// Resolves per-device keys from the credential store.
pub struct DeviceKeyResolver<'a> {
    store: &'a CredentialStore,
}

impl<'a> DeviceKeyResolver<'a> {
    pub fn new(store: &'a CredentialStore) -> Self {
        Self { store }
    }
}

impl KeyResolver for DeviceKeyResolver<'_> {
    fn resolve(&self, claims: &UnverifiedClaims) -> Result<Vec<u8>, AuthError> {
        let (Some(device_id), Some(org_id)) = (claims.str_claim("device_id"), claims.str_claim("org_id")) else {
            return Err(AuthError::InvalidToken);
        };

        let key = self
            .store
            .find_device_key(device_id, org_id)?
            .ok_or(AuthError::DeviceNotFound)?;

        Base64::decode_vec(key.encoded()).map_err(|_| {
            tracing::error!(%device_id, %org_id, "Stored device key is not valid base64");
            AuthError::Storage(format!("corrupt key for device {device_id}"))
        })
    }
}

/// Resolves every token to one process-wide key (user session tokens).
pub struct StaticKeyResolver<'a> {
    key: &'a [u8],
}

impl<'a> StaticKeyResolver<'a> {
    pub fn new(key: &'a [u8]) -> Self {
        Self { key }
    }
}

impl KeyResolver for StaticKeyResolver<'_> {
    fn resolve(&self, _claims: &UnverifiedClaims) -> Result<Vec<u8>, AuthError> {
        Ok(self.key.to_vec())
    }
}
