// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HMAC JWT signing and verification.
//!
//! ## Verification order
//!
//! 1. Decode the header and reject any algorithm other than the codec's own
//!    (this also rejects `none`, which jsonwebtoken cannot even represent)
//! 2. Read the claims without verifying them
//! 3. Ask the [`KeyResolver`] for the key those claims point at
//! 4. Verify the signature and structural claims with that key
//!
//! No key lookup happens for a token with the wrong algorithm, and a lookup
//! miss is reported exactly like a bad signature at the HTTP boundary.

use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use super::resolver::{KeyResolver, UnverifiedClaims};
use super::AuthError;

/// Clock skew tolerance for device-minted tokens (60 seconds).
pub const DEVICE_CLOCK_SKEW_LEEWAY: u64 = 60;

/// Signs and parses tokens with one fixed HMAC algorithm.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    leeway: u64,
    required_claims: &'static [&'static str],
}

impl TokenCodec {
    /// Codec for device bearer tokens: HS512, only `exp` checked when present.
    pub fn device() -> Self {
        Self {
            algorithm: Algorithm::HS512,
            leeway: DEVICE_CLOCK_SKEW_LEEWAY,
            required_claims: &[],
        }
    }

    /// Codec for user session tokens: HS256, `exp` and `sub` mandatory.
    pub fn session() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            leeway: 0,
            required_claims: &["exp", "sub"],
        }
    }

    /// Produce a compact signed token.
    pub fn sign<C: Serialize>(&self, claims: &C, key: &[u8]) -> Result<String, AuthError> {
        if key.is_empty() {
            return Err(AuthError::Signing("empty signing key".to_string()));
        }
        encode(&Header::new(self.algorithm), claims, &EncodingKey::from_secret(key))
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify a token and return its claims.
    ///
    /// Errors are `InvalidToken` except those raised by `resolver`, which
    /// propagate unchanged.
    pub fn parse<C, R>(&self, token: &str, resolver: &R) -> Result<C, AuthError>
    where
        C: DeserializeOwned,
        R: KeyResolver + ?Sized,
    {
        let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;
        if header.alg != self.algorithm {
            tracing::debug!(alg = ?header.alg, expected = ?self.algorithm, "Rejecting token with unexpected algorithm");
            return Err(AuthError::InvalidToken);
        }

        let unverified = jsonwebtoken::dangerous::insecure_decode::<Map<String, Value>>(token)
            .map_err(|_| AuthError::InvalidToken)?;
        let key = resolver.resolve(&UnverifiedClaims::new(unverified.claims))?;

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = self.leeway;
        validation.validate_aud = false;
        validation.set_required_spec_claims(self.required_claims);

        decode::<C>(token, &DecodingKey::from_secret(&key), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(kind = ?e.kind(), "Token verification failed");
                AuthError::InvalidToken
            })
    }
}
