// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded credential database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `devices`: `(org_id, device_id)` → serialized DeviceRecord
//! - `users`: lower-cased email → serialized UserRecord
//! - `token_records`: token_id → serialized IssuedTokenRecord
//! - `counters`: name → u64 (monotonic id allocation)
//!
//! Every mutation runs in a single write transaction and reports how many
//! rows it touched. Callers treat anything other than exactly one as a
//! failure; that count is the only concurrency guard this service relies on.

use std::path::Path;
use std::time::Duration;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::records::{DeviceKey, DeviceListing, DeviceRecord, IssuedTokenRecord, UserRecord};

// =============================================================================
// Table Definitions
// =============================================================================

/// Devices keyed by `(org_id, device_id)` so an org's devices are contiguous.
const DEVICES: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("devices");

/// Users keyed by lower-cased email.
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Issued token records keyed by token_id.
const TOKEN_RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("token_records");

/// Named monotonic counters.
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Counter backing token_id allocation. Never decremented, so ids are not
/// reused after their records are pruned.
const TOKEN_ID_COUNTER: &str = "token_id";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Startup retry
// =============================================================================

/// Bounded exponential backoff used only while opening the store at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 9,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }
}

// =============================================================================
// CredentialStore
// =============================================================================

/// Authoritative store for device keys, users and the revocation ledger.
pub struct CredentialStore {
    db: Database,
}

impl CredentialStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(DEVICES)?;
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(TOKEN_RECORDS)?;
            let _ = write_txn.open_table(COUNTERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Open the database, retrying with backoff while it is unavailable.
    ///
    /// Only meant for startup. Once the service is running, store failures
    /// are surfaced to the caller immediately.
    pub async fn open_with_retry(path: &Path, policy: &RetryPolicy) -> StoreResult<Self> {
        let attempts = policy.attempts.max(1);
        let mut delay = policy.base_delay;
        let mut attempt = 1;

        loop {
            match Self::open(path) {
                Ok(store) => {
                    tracing::info!(attempt, path = %path.display(), "Credential store opened");
                    return Ok(store);
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Credential store unavailable, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(policy.max_delay);
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempts = attempt, error = %e, "Giving up opening credential store");
                    return Err(e);
                }
            }
        }
    }

    /// Cheap liveness check used by the readiness probe.
    pub fn ping(&self) -> StoreResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(COUNTERS)?;
        Ok(())
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// Provision a new device. Returns 0 if the device already exists.
    ///
    /// Provisioning is driven by an external process; the service itself
    /// never creates devices.
    pub fn provision_device(
        &self,
        device_id: &str,
        org_id: &str,
        raw_key: &[u8],
        created_at: i64,
    ) -> StoreResult<u64> {
        let record = DeviceRecord {
            device_id: device_id.to_string(),
            org_id: org_id.to_string(),
            device_key: DeviceKey::from_bytes(raw_key),
            created_at,
            joined_at: None,
            last_seen: None,
            profile_url: None,
        };
        let json = serde_json::to_vec(&record)?;

        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(DEVICES)?;
            let exists = table.get((org_id, device_id))?.is_some();
            if !exists {
                table.insert((org_id, device_id), json.as_slice())?;
            }
            !exists
        };
        if !inserted {
            write_txn.abort()?;
            return Ok(0);
        }
        write_txn.commit()?;
        Ok(1)
    }

    /// Look up a single device.
    pub fn get_device(&self, device_id: &str, org_id: &str) -> StoreResult<Option<DeviceRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEVICES)?;
        match table.get((org_id, device_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Fetch the stored (still encoded) key of exactly one device.
    pub fn find_device_key(&self, device_id: &str, org_id: &str) -> StoreResult<Option<DeviceKey>> {
        Ok(self
            .get_device(device_id, org_id)?
            .map(|device| device.device_key))
    }

    /// Set `joined_at`. Returns rows affected.
    ///
    /// Also returns the `joined_at` that was replaced, read in the same write
    /// transaction, so concurrent first joins see exactly one `None`.
    pub fn update_device_joined(
        &self,
        device_id: &str,
        org_id: &str,
        joined_at: i64,
    ) -> StoreResult<(u64, Option<i64>)> {
        let previous = self.update_device(device_id, org_id, |device| device.joined_at.replace(joined_at))?;
        Ok(match previous {
            Some(previous) => (1, previous),
            None => (0, None),
        })
    }

    /// Heartbeat write. Returns rows affected.
    pub fn update_device_last_seen(&self, device_id: &str, org_id: &str, last_seen: i64) -> StoreResult<u64> {
        let updated = self.update_device(device_id, org_id, |device| device.last_seen = Some(last_seen))?;
        Ok(u64::from(updated.is_some()))
    }

    /// Record the profile chosen for a device. Returns rows affected.
    pub fn assign_device_profile(&self, device_id: &str, org_id: &str, profile_url: &str) -> StoreResult<u64> {
        let updated = self.update_device(device_id, org_id, |device| {
            device.profile_url = Some(profile_url.to_string())
        })?;
        Ok(u64::from(updated.is_some()))
    }

    /// Read the profile URL of a device.
    ///
    /// Outer `None` means no such device; inner `None` means still waiting.
    pub fn read_device_profile(&self, device_id: &str, org_id: &str) -> StoreResult<Option<Option<String>>> {
        Ok(self
            .get_device(device_id, org_id)?
            .map(|device| device.profile_url.filter(|url| !url.is_empty())))
    }

    /// All devices of an org, in device_id order.
    pub fn list_devices(&self, org_id: &str) -> StoreResult<Vec<DeviceListing>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEVICES)?;

        let mut devices = Vec::new();
        for entry in table.range((org_id, "")..)? {
            let (key, value) = entry?;
            if key.value().0 != org_id {
                break;
            }
            let record: DeviceRecord = serde_json::from_slice(value.value())?;
            devices.push(record.into());
        }
        Ok(devices)
    }

    /// Read-modify-write of one device row inside a single write transaction.
    ///
    /// Returns `None` when no such device exists, otherwise whatever `mutate` returned.
    fn update_device<F, T>(&self, device_id: &str, org_id: &str, mutate: F) -> StoreResult<Option<T>>
    where
        F: FnOnce(&mut DeviceRecord) -> T,
    {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(DEVICES)?;

            // Read existing value and deserialize before mutating
            let existing = table.get((org_id, device_id))?.map(|v| v.value().to_vec());
            match existing {
                Some(bytes) => {
                    let mut device: DeviceRecord = serde_json::from_slice(&bytes)?;
                    let output = mutate(&mut device);
                    let json = serde_json::to_vec(&device)?;
                    table.insert((org_id, device_id), json.as_slice())?;
                    Some(output)
                }
                None => None,
            }
        };
        if updated.is_none() {
            write_txn.abort()?;
            return Ok(None);
        }
        write_txn.commit()?;
        Ok(updated)
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Create a user account. Returns 0 if the account already exists.
    pub fn insert_user(&self, user_id: &str, created_at: i64) -> StoreResult<u64> {
        let user_id = user_id.to_lowercase();
        let record = UserRecord {
            user_id: user_id.clone(),
            created_at,
            last_login: None,
        };
        let json = serde_json::to_vec(&record)?;

        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(USERS)?;
            let exists = table.get(user_id.as_str())?.is_some();
            if !exists {
                table.insert(user_id.as_str(), json.as_slice())?;
            }
            !exists
        };
        if !inserted {
            write_txn.abort()?;
            return Ok(0);
        }
        write_txn.commit()?;
        Ok(1)
    }

    /// Look up a user by (case-insensitive) email.
    pub fn get_user(&self, user_id: &str) -> StoreResult<Option<UserRecord>> {
        let user_id = user_id.to_lowercase();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(user_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Stamp a successful login. Returns rows affected.
    pub fn update_user_last_login(&self, user_id: &str, now: i64) -> StoreResult<u64> {
        let user_id = user_id.to_lowercase();
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(USERS)?;
            let existing = table.get(user_id.as_str())?.map(|v| v.value().to_vec());
            match existing {
                Some(bytes) => {
                    let mut user: UserRecord = serde_json::from_slice(&bytes)?;
                    user.last_login = Some(now);
                    let json = serde_json::to_vec(&user)?;
                    table.insert(user_id.as_str(), json.as_slice())?;
                    true
                }
                None => false,
            }
        };
        if !updated {
            write_txn.abort()?;
            return Ok(0);
        }
        write_txn.commit()?;
        Ok(1)
    }

    // =========================================================================
    // Token records (revocation ledger)
    // =========================================================================

    /// Allocate a token_id and insert its record in one write transaction.
    ///
    /// Returns `(rows_affected, token_id)`. Allocation and insert commit
    /// together, so concurrent issuers can never observe each other's ids.
    pub fn insert_token_record(&self, user_id: &str, created_at: i64, expires_at: i64) -> StoreResult<(u64, u64)> {
        let write_txn = self.db.begin_write()?;
        let (token_id, clobbered) = {
            let mut counters = write_txn.open_table(COUNTERS)?;
            let token_id = counters.get(TOKEN_ID_COUNTER)?.map(|v| v.value()).unwrap_or(0) + 1;
            counters.insert(TOKEN_ID_COUNTER, token_id)?;

            let record = IssuedTokenRecord {
                token_id,
                user_id: user_id.to_string(),
                created_at,
                expires_at,
            };
            let json = serde_json::to_vec(&record)?;

            let mut records = write_txn.open_table(TOKEN_RECORDS)?;
            let clobbered = records.insert(token_id, json.as_slice())?.is_some();
            (token_id, clobbered)
        };
        if clobbered {
            write_txn.abort()?;
            return Ok((0, token_id));
        }
        write_txn.commit()?;
        Ok((1, token_id))
    }

    /// Look up the record backing a token pair.
    pub fn find_token_record(&self, token_id: u64) -> StoreResult<Option<IssuedTokenRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TOKEN_RECORDS)?;
        match table.get(token_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Delete one record. Returns rows affected.
    pub fn delete_token_record(&self, token_id: u64) -> StoreResult<u64> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TOKEN_RECORDS)?;
            let removed = table.remove(token_id)?.is_some();
            removed
        };
        if !removed {
            write_txn.abort()?;
            return Ok(0);
        }
        write_txn.commit()?;
        Ok(1)
    }

    /// Delete every record with `expires_at < now`. Returns rows affected.
    pub fn delete_expired_token_records(&self, now: i64) -> StoreResult<u64> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TOKEN_RECORDS)?;

            let mut expired = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let record: IssuedTokenRecord = serde_json::from_slice(value.value())?;
                if record.is_expired_at(now) {
                    expired.push(key.value());
                }
            }

            for token_id in &expired {
                table.remove(*token_id)?;
            }
            expired.len() as u64
        };
        write_txn.commit()?;
        Ok(removed)
    }
}

// =============================================================================
// Tests
// =============================================================================
