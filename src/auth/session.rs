// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User session token issuance, rotation and revocation.
//!
//! ## Revocation model
//!
//! Each issued pair is backed by one `IssuedTokenRecord`. A refresh token is
//! accepted only while its record exists and has not expired, so deleting
//! the record revokes it regardless of the signed `exp`.
//!
//! On rotation the old record is left in place by default and disappears
//! when a later issuance prunes expired records. Until then the previous
//! refresh token stays usable. Setting `revoke_on_rotation` closes that
//! window by deleting the old record before the new pair is minted.

use std::sync::Arc;

use chrono::Utc;

use super::claims::{AuthenticatedUser, SessionClaims, TokenKind, TokenPair};
use super::codec::TokenCodec;
use super::resolver::StaticKeyResolver;
use super::AuthError;
use crate::storage::CredentialStore;

/// Default access token lifetime (10 seconds).
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 10;

/// Default refresh token lifetime (10 days).
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 10 * 24 * 60 * 60;

/// Upper bound on either token lifetime (10 years).
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Session token settings.
#[derive(Clone)]
pub struct SessionConfig {
    /// Process-wide HMAC key for session tokens
    pub signing_key: Vec<u8>,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    /// Delete the presented refresh token's record when rotating it
    pub revoke_on_rotation: bool,
}

impl SessionConfig {
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_key: signing_key.into(),
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
            revoke_on_rotation: false,
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("signing_key", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("revoke_on_rotation", &self.revoke_on_rotation)
            .finish()
    }
}

/// Mints access/refresh pairs backed by a token record.
#[derive(Clone)]
pub struct SessionIssuer {
    store: Arc<CredentialStore>,
    config: Arc<SessionConfig>,
    codec: TokenCodec,
}

impl SessionIssuer {
    pub fn new(store: Arc<CredentialStore>, config: SessionConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            codec: TokenCodec::session(),
        }
    }

    /// Issue a new pair for `user_id`.
    ///
    /// Concurrent calls for the same user each get their own record and
    /// their own valid pair.
    pub fn issue(&self, user_id: &str) -> Result<TokenPair, AuthError> {
        let now = Utc::now().timestamp();
        let expiry = |ttl: i64| {
            now.checked_add(ttl)
                .ok_or_else(|| AuthError::Signing(format!("token lifetime {ttl}s overflows expiry")))
        };
        let access_exp = expiry(self.config.access_ttl_secs)?;
        let refresh_exp = expiry(self.config.refresh_ttl_secs)?;
        let user_id = user_id.to_lowercase();

        let (rows, token_id) = self.store.insert_token_record(&user_id, now, refresh_exp)?;
        if rows != 1 {
            return Err(AuthError::Storage(format!(
                "token record insert affected {rows} rows, expected 1"
            )));
        }

        match self.store.delete_expired_token_records(now) {
            Ok(0) => {}
            Ok(pruned) => tracing::debug!(pruned, "Pruned expired token records"),
            Err(e) => tracing::warn!(error = %e, "Failed to prune expired token records"),
        }

        let access = SessionClaims {
            iat: now,
            exp: access_exp,
            sub: user_id.clone(),
            kind: TokenKind::Access,
            tid: token_id,
        };
        let refresh = SessionClaims {
            iat: now,
            exp: refresh_exp,
            sub: user_id,
            kind: TokenKind::Refresh,
            tid: token_id,
        };

        let pair = TokenPair {
            access_token: self.codec.sign(&access, &self.config.signing_key)?,
            refresh_token: self.codec.sign(&refresh, &self.config.signing_key)?,
        };
        tracing::info!(token_id, "Issued session token pair");
        Ok(pair)
    }

    /// Verify an access token (stateless: signature, expiry and kind only).
    pub fn verify_access(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.decode(token)?;
        if claims.kind != TokenKind::Access {
            return Err(AuthError::Unauthorized("not an access token"));
        }
        Ok(AuthenticatedUser::from_claims(claims))
    }

    fn decode(&self, token: &str) -> Result<SessionClaims, AuthError> {
        self.codec
            .parse(token, &StaticKeyResolver::new(&self.config.signing_key))
    }
}

/// Validates presented refresh tokens against the revocation ledger.
pub struct RefreshValidator<'a> {
    issuer: &'a SessionIssuer,
}

impl<'a> RefreshValidator<'a> {
    pub fn new(issuer: &'a SessionIssuer) -> Self {
        Self { issuer }
    }

    /// Exchange a refresh token for a new pair.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.validate(refresh_token)?;

        if self.issuer.config.revoke_on_rotation {
            // Exactly one concurrent rotation may consume the record
            let rows = self.issuer.store.delete_token_record(claims.tid).map_err(|e| {
                tracing::error!(token_id = claims.tid, error = %e, "Failed to revoke rotated token record");
                AuthError::Unauthorized("revocation failed")
            })?;
            if rows != 1 {
                tracing::warn!(token_id = claims.tid, rows, "Refresh token already rotated");
                return Err(AuthError::Unauthorized("token record already consumed"));
            }
        }

        self.issuer.issue(&claims.sub)
    }

    /// Validate a refresh token, then delete its record (logout).
    pub fn revoke(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self.validate(refresh_token)?;
        let rows = self.issuer.store.delete_token_record(claims.tid)?;
        if rows != 1 {
            return Err(AuthError::Unauthorized("token record already removed"));
        }
        tracing::info!(token_id = claims.tid, "Revoked session token record");
        Ok(())
    }

    /// Steps (a)–(d): signature, kind, embedded expiry, ledger record.
    fn validate(&self, refresh_token: &str) -> Result<SessionClaims, AuthError> {
        let claims = self.issuer.decode(refresh_token).map_err(|e| {
            tracing::info!(error = %e, "Refresh token failed verification");
            AuthError::Unauthorized("refresh token failed verification")
        })?;

        if claims.kind != TokenKind::Refresh {
            tracing::info!(token_id = claims.tid, "Token presented for refresh is not a refresh token");
            return Err(AuthError::Unauthorized("not a refresh token"));
        }

        let record = match self.issuer.store.find_token_record(claims.tid) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::info!(token_id = claims.tid, "Refresh token record not found, maybe revoked");
                return Err(AuthError::Unauthorized("token record missing"));
            }
            Err(e) => {
                tracing::error!(token_id = claims.tid, error = %e, "Token record lookup failed");
                return Err(AuthError::Unauthorized("token record lookup failed"));
            }
        };

        if record.is_expired_at(Utc::now().timestamp()) {
            tracing::info!(token_id = claims.tid, "Refresh token record expired");
            return Err(AuthError::Unauthorized("token record expired"));
        }
        if record.user_id != claims.sub {
            tracing::warn!(token_id = claims.tid, "Refresh token subject does not match its record");
            return Err(AuthError::Unauthorized("token record belongs to another user"));
        }

        Ok(claims)
    }
}
