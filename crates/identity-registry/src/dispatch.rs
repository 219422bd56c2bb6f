//! Call dispatch — the boundary between transports and the registry.
//!
//! Callers address the registry by contract name and operation name, pass
//! already-decoded [`Value`] arguments, and name the calling principal.
//! Two call kinds exist:
//!
//! - [`CallKind::Public`] may invoke any operation.
//! - [`CallKind::ReadOnly`] may only invoke `get-identity-data` and
//!   `is-identity-active`; anything else is rejected before the registry is
//!   touched, so a read-only call never mutates state.
//!
//! Every call, successful or not, is appended to a bounded journal.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::config::RegistryConfig;
use crate::error::DispatchError;
use crate::principal::Principal;
use crate::registry::IdentityRegistry;

// ── Values ────────────────────────────────────────────────────────────────────

/// A decoded argument or result value.
///
/// Serialized as `{"type": "buffer", "value": "<base64>"}`,
/// `{"type": "principal", "value": "ST..."}` or `{"type": "bool", "value": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Bool(bool),
    Buffer(#[serde(with = "crate::serde_helpers::base64_bytes")] Vec<u8>),
    Principal(Principal),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Buffer(_) => "buffer",
            Self::Principal(_) => "principal",
        }
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

/// The registry operations reachable through dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    RegisterIdentity,
    GetIdentityData,
    UpdateIdentity,
    IsIdentityActive,
    DeactivateIdentity,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Self::RegisterIdentity,
        Self::GetIdentityData,
        Self::UpdateIdentity,
        Self::IsIdentityActive,
        Self::DeactivateIdentity,
    ];

    /// Wire name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterIdentity => "register-identity",
            Self::GetIdentityData => "get-identity-data",
            Self::UpdateIdentity => "update-identity",
            Self::IsIdentityActive => "is-identity-active",
            Self::DeactivateIdentity => "deactivate-identity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::GetIdentityData | Self::IsIdentityActive)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which call interface was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Public,
    ReadOnly,
}

// ── Journal ───────────────────────────────────────────────────────────────────

/// One journaled call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub kind: CallKind,
    pub contract: String,
    pub operation: String,
    pub args: Vec<Value>,
    pub caller: Principal,
    /// Result value, or the numeric failure code.
    pub outcome: Result<Value, u32>,
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Routes named calls to an [`IdentityRegistry`].
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<IdentityRegistry>,
    contract_name: String,
    max_payload_bytes: usize,
    journal_capacity: usize,
    journal: Mutex<VecDeque<CallRecord>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<IdentityRegistry>, config: &RegistryConfig) -> Self {
        Self {
            registry,
            contract_name: config.contract_name.clone(),
            max_payload_bytes: config.max_payload_bytes,
            journal_capacity: config.journal_capacity,
            journal: Mutex::new(VecDeque::new()),
        }
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    pub fn contract_name(&self) -> &str {
        &self.contract_name
    }

    /// Invoke any operation.
    ///
    /// # Errors
    ///
    /// Registry failures are returned as `DispatchError::Registry`; malformed
    /// calls fail with one of the other variants (code 400).
    pub fn call_public(
        &self,
        contract: &str,
        operation: &str,
        args: &[Value],
        caller: &Principal,
    ) -> Result<Value, DispatchError> {
        self.call(CallKind::Public, contract, operation, args, caller)
    }

    /// Invoke a read-only operation.
    ///
    /// # Errors
    ///
    /// As [`Dispatcher::call_public`], plus `DispatchError::NotReadOnly` for
    /// mutating operations.
    pub fn call_read_only(
        &self,
        contract: &str,
        operation: &str,
        args: &[Value],
        caller: &Principal,
    ) -> Result<Value, DispatchError> {
        self.call(CallKind::ReadOnly, contract, operation, args, caller)
    }

    /// Journaled calls, oldest first.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.journal().iter().cloned().collect()
    }

    pub fn last_call(&self) -> Option<CallRecord> {
        self.journal().back().cloned()
    }

    pub fn clear_calls(&self) {
        self.journal().clear();
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn call(
        &self,
        kind: CallKind,
        contract: &str,
        operation: &str,
        args: &[Value],
        caller: &Principal,
    ) -> Result<Value, DispatchError> {
        let result = self.execute(kind, contract, operation, args, caller);

        if let Err(e) = &result {
            log::debug!("{operation} by {caller} failed with {}: {e}", e.code());
        }

        self.record(CallRecord {
            kind,
            contract: contract.to_string(),
            operation: operation.to_string(),
            args: args.to_vec(),
            caller: caller.clone(),
            outcome: result.clone().map_err(|e| e.code()),
        });

        result
    }

    fn execute(
        &self,
        kind: CallKind,
        contract: &str,
        operation: &str,
        args: &[Value],
        caller: &Principal,
    ) -> Result<Value, DispatchError> {
        if contract != self.contract_name {
            return Err(DispatchError::UnknownContract(contract.to_string()));
        }

        let op = Operation::from_name(operation)
            .ok_or_else(|| DispatchError::UnknownOperation(operation.to_string()))?;

        if kind == CallKind::ReadOnly && !op.is_read_only() {
            return Err(DispatchError::NotReadOnly(op.name().to_string()));
        }

        let registry = &self.registry;
        let value = match op {
            Operation::RegisterIdentity => {
                let data = self.buffer_arg(op, args)?;
                Value::Bool(registry.register_identity(caller, data)?)
            }
            Operation::UpdateIdentity => {
                let data = self.buffer_arg(op, args)?;
                Value::Bool(registry.update_identity(caller, data)?)
            }
            Operation::DeactivateIdentity => {
                let target = principal_arg(op, args)?;
                Value::Bool(registry.deactivate_identity(caller, &target)?)
            }
            Operation::GetIdentityData => {
                let target = principal_arg(op, args)?;
                Value::Buffer(registry.get_identity_data(caller, &target)?)
            }
            Operation::IsIdentityActive => {
                let target = principal_arg(op, args)?;
                Value::Bool(registry.is_identity_active(caller, &target)?)
            }
        };

        Ok(value)
    }

    fn buffer_arg(&self, op: Operation, args: &[Value]) -> Result<Vec<u8>, DispatchError> {
        match single_arg(op, args)? {
            Value::Buffer(data) if data.len() > self.max_payload_bytes => {
                Err(DispatchError::PayloadTooLarge {
                    limit: self.max_payload_bytes,
                    actual: data.len(),
                })
            }
            Value::Buffer(data) => Ok(data.clone()),
            other => Err(wrong_type(op, "buffer", other)),
        }
    }

    fn record(&self, entry: CallRecord) {
        if self.journal_capacity == 0 {
            return;
        }
        let mut journal = self.journal();
        while journal.len() >= self.journal_capacity {
            journal.pop_front();
        }
        journal.push_back(entry);
    }

    fn journal(&self) -> MutexGuard<'_, VecDeque<CallRecord>> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn single_arg(op: Operation, args: &[Value]) -> Result<&Value, DispatchError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(DispatchError::InvalidArguments {
            operation: op.name().to_string(),
            reason: format!("expected 1 argument, got {}", args.len()),
        }),
    }
}

fn principal_arg(op: Operation, args: &[Value]) -> Result<Principal, DispatchError> {
    match single_arg(op, args)? {
        Value::Principal(p) => Principal::parse(p.as_str()),
        other => Err(wrong_type(op, "principal", other)),
    }
}

fn wrong_type(op: Operation, expected: &str, got: &Value) -> DispatchError {
    DispatchError::InvalidArguments {
        operation: op.name().to_string(),
        reason: format!("expected {expected}, got {}", got.type_name()),
    }
}
