// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Device and user authentication for the Polaris API.
//!
//! ## Device Flow
//!
//! 1. A device is provisioned out-of-band with a random symmetric key
//! 2. The device signs its own HS512 JWT carrying `device_id` and `org_id`
//! 3. The server:
//!    - Rejects any algorithm other than HS512
//!    - Looks up the key for the claimed `(device_id, org_id)`
//!    - Verifies the signature with that key
//!
//! ## User Flow
//!
//! 1. The user completes OAuth with the identity provider
//! 2. `GET /v1/device/auth/token?code=...` resolves the primary email and
//!    issues an HS256 access/refresh pair sharing one token record
//! 3. The refresh token is exchanged for a new pair while its record lives
//!
//! ## Security
//!
//! - Unknown identities and bad signatures are rejected identically
//! - Device keys, session keys and tokens are never logged
//! - Device tokens get 60 seconds of clock skew; session tokens none

pub mod claims;
pub mod codec;
pub mod error;
pub mod extractor;
pub mod identity;
pub mod resolver;
pub mod session;

pub use claims::{AuthenticatedDevice, AuthenticatedUser, DeviceClaims, SessionClaims, TokenKind, TokenPair};
pub use codec::TokenCodec;
pub use error::AuthError;
pub use extractor::{DeviceAuth, UserAuth};
pub use identity::{OAuthConfig, OAuthProvider};
pub use resolver::{DeviceKeyResolver, KeyResolver, StaticKeyResolver};
pub use session::{RefreshValidator, SessionConfig, SessionIssuer};
