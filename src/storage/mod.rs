// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential Storage Module
//!
//! A single embedded redb database is the source of truth for:
//!
//! - per-device symmetric keys and onboarding state,
//! - user accounts,
//! - issued token records (the revocation ledger).
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   credentials.redb
//! ```
//!
//! ## Important Notes
//!
//! - Device keys are base64-encoded at rest and are never returned by the API
//! - A refresh token is only as valid as its record in `token_records`
//! - Mutations return affected-row counts; callers must check them

pub mod credential_db;
pub mod records;

pub use credential_db::{CredentialStore, RetryPolicy, StoreError, StoreResult};
pub use records::{DeviceKey, DeviceListing, DeviceRecord, IssuedTokenRecord, UserRecord};

/// File name of the credential database inside the data directory.
pub const CREDENTIALS_DB_FILE: &str = "credentials.redb";
