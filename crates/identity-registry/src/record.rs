//! Identity records — the single entity type held by the registry.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::principal::Principal;

/// One registered identity.
///
/// `owner` is fixed at creation. `active` only ever moves from `true` to
/// `false`. Records are never removed from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// The principal that registered this identity.
    pub owner: Principal,
    /// Opaque caller-supplied payload.
    #[serde(with = "crate::serde_helpers::base64_bytes")]
    pub data: Vec<u8>,
    /// Whether the identity is still active.
    pub active: bool,
    /// Registration timestamp (microseconds since epoch).
    pub registered_at: u64,
    /// Timestamp of the last data write (microseconds since epoch).
    pub updated_at: u64,
    /// Timestamp of deactivation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<u64>,
}

impl IdentityRecord {
    /// A fresh, active record owned by `owner`.
    pub fn new(owner: Principal, data: Vec<u8>, now: u64) -> Self {
        Self {
            owner,
            data,
            active: true,
            registered_at: now,
            updated_at: now,
            deactivated_at: None,
        }
    }

    pub fn is_owned_by(&self, principal: &Principal) -> bool {
        &self.owner == principal
    }

    /// Lowercase hex SHA-256 of the payload.
    ///
    /// Logs and listings carry this instead of the payload bytes.
    pub fn data_digest(&self) -> String {
        digest_hex(&self.data)
    }
}

pub(crate) fn digest_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
