//! The identity registry — one record per principal.
//!
//! Every operation validates all of its preconditions before touching the
//! table, and runs under a single lock acquisition, so each call is atomic
//! with respect to every other call on the same registry. Two concurrent
//! registrations for the same principal serialize on the write lock: the
//! first inserts, the second observes the record and fails with
//! [`RegistryError::Conflict`].
//!
//! Reads take the shared lock and see the most recently committed state.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::clock::{Clock, SystemClock};
use crate::error::{RegistryError, Result};
use crate::principal::Principal;
use crate::record::{digest_hex, IdentityRecord};

/// In-memory identity registry.
///
/// Instances are independent; share one across threads with `Arc`.
#[derive(Debug)]
pub struct IdentityRegistry {
    records: RwLock<HashMap<Principal, IdentityRecord>>,
    clock: Arc<dyn Clock>,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    /// An empty registry stamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// An empty registry stamped by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Rebuild a registry from previously captured records.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Conflict` if two records share an owner.
    pub fn from_records(
        records: impl IntoIterator<Item = IdentityRecord>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut table = HashMap::new();
        for record in records {
            match table.entry(record.owner.clone()) {
                Entry::Occupied(_) => return Err(RegistryError::Conflict(record.owner)),
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
            }
        }
        Ok(Self {
            records: RwLock::new(table),
            clock,
        })
    }

    // ── Mutating operations ───────────────────────────────────────────────────

    /// Register an identity for `caller`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Conflict` if `caller` already has a record.
    /// The stored record is left untouched.
    pub fn register_identity(&self, caller: &Principal, data: Vec<u8>) -> Result<bool> {
        let now = self.clock.now_micros();
        let mut records = self.write();

        match records.entry(caller.clone()) {
            Entry::Occupied(_) => {
                log::debug!("register-identity rejected: {caller} already registered");
                Err(RegistryError::Conflict(caller.clone()))
            }
            Entry::Vacant(slot) => {
                log::info!(
                    "registered identity {caller} ({} bytes, sha256 {})",
                    data.len(),
                    digest_hex(&data)
                );
                slot.insert(IdentityRecord::new(caller.clone(), data, now));
                Ok(true)
            }
        }
    }

    /// Replace the payload of the caller's own record.
    ///
    /// The target is always the caller's record; there is no way to update
    /// another principal's identity. Allowed on inactive records, which
    /// stay inactive.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if `caller` has no record.
    pub fn update_identity(&self, caller: &Principal, new_data: Vec<u8>) -> Result<bool> {
        let now = self.clock.now_micros();
        let mut records = self.write();

        let Some(record) = records.get_mut(caller) else {
            log::debug!("update-identity rejected: {caller} not registered");
            return Err(RegistryError::NotFound(caller.clone()));
        };

        log::info!(
            "updated identity {caller} ({} bytes, sha256 {})",
            new_data.len(),
            digest_hex(&new_data)
        );
        record.data = new_data;
        record.updated_at = now;
        Ok(true)
    }

    /// Mark `target`'s record inactive.
    ///
    /// Existence is checked before ownership: an unknown target is always
    /// `NotFound`, whoever the caller. Deactivating an already inactive
    /// record succeeds and keeps the original deactivation time.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if `target` has no record, or
    /// `RegistryError::Unauthorized` if `caller` is not its owner.
    pub fn deactivate_identity(&self, caller: &Principal, target: &Principal) -> Result<bool> {
        let now = self.clock.now_micros();
        let mut records = self.write();

        let Some(record) = records.get_mut(target) else {
            log::debug!("deactivate-identity rejected: {target} not registered");
            return Err(RegistryError::NotFound(target.clone()));
        };

        if !record.is_owned_by(caller) {
            log::debug!("deactivate-identity rejected: {caller} does not own {target}");
            return Err(RegistryError::Unauthorized {
                caller: caller.clone(),
                target: target.clone(),
            });
        }

        if record.active {
            record.active = false;
            record.deactivated_at = Some(now);
            log::info!("deactivated identity {target}");
        }
        Ok(true)
    }

    // ── Read-only operations ──────────────────────────────────────────────────

    /// Payload stored for `target`. Any requester may read any record.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if `target` has no record.
    pub fn get_identity_data(&self, requester: &Principal, target: &Principal) -> Result<Vec<u8>> {
        log::trace!("get-identity-data {target} requested by {requester}");
        self.read()
            .get(target)
            .map(|record| record.data.clone())
            .ok_or_else(|| RegistryError::NotFound(target.clone()))
    }

    /// Whether `target`'s record is active.
    ///
    /// An unregistered principal is `NotFound`, never `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if `target` has no record.
    pub fn is_identity_active(&self, requester: &Principal, target: &Principal) -> Result<bool> {
        log::trace!("is-identity-active {target} requested by {requester}");
        self.read()
            .get(target)
            .map(|record| record.active)
            .ok_or_else(|| RegistryError::NotFound(target.clone()))
    }

    /// Full copy of `target`'s record.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if `target` has no record.
    pub fn get_identity(&self, target: &Principal) -> Result<IdentityRecord> {
        self.read()
            .get(target)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(target.clone()))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registered principals, sorted.
    pub fn principals(&self) -> Vec<Principal> {
        let mut principals: Vec<Principal> = self.read().keys().cloned().collect();
        principals.sort();
        principals
    }

    /// Consistent copy of every record, sorted by owner.
    pub fn records(&self) -> Vec<IdentityRecord> {
        let mut records: Vec<IdentityRecord> = self.read().values().cloned().collect();
        records.sort_by(|a, b| a.owner.cmp(&b.owner));
        records
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    // No operation panics while holding the lock, so a poisoned lock still
    // guards a consistent table.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Principal, IdentityRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Principal, IdentityRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}
