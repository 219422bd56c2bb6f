//! Error types for the identity registry.
//!
//! Registry failures are a closed taxonomy of three numeric codes. The
//! dispatch and storage adapters wrap them with their own failures but
//! never extend the registry's set.
//! Payload bytes are never included in error messages.

use crate::principal::Principal;

/// Numeric code for a caller that does not own the target record.
pub const CODE_UNAUTHORIZED: u32 = 401;

/// Numeric code for a reference to a principal with no record.
pub const CODE_NOT_FOUND: u32 = 404;

/// Numeric code for a registration that collides with an existing record.
pub const CODE_CONFLICT: u32 = 409;

/// Numeric code for calls rejected by the dispatch boundary before they
/// reach the registry.
pub const CODE_BAD_REQUEST: u32 = 400;

/// Failures produced by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unauthorized: {caller} does not own the identity of {target}")]
    Unauthorized { caller: Principal, target: Principal },

    #[error("Identity not found: {0}")]
    NotFound(Principal),

    #[error("Identity already registered: {0}")]
    Conflict(Principal),
}

impl RegistryError {
    /// The fixed numeric code for this failure (401, 404 or 409).
    pub fn code(&self) -> u32 {
        match self {
            Self::Unauthorized { .. } => CODE_UNAUTHORIZED,
            Self::NotFound(_) => CODE_NOT_FOUND,
            Self::Conflict(_) => CODE_CONFLICT,
        }
    }
}

/// Failures produced at the call-dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Unknown contract: {0}")]
    UnknownContract(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Operation {0} mutates state and cannot be invoked read-only")]
    NotReadOnly(String),

    #[error("Invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("Payload of {actual} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { limit: usize, actual: usize },

    #[error("Invalid principal: {0}")]
    InvalidPrincipal(String),
}

impl DispatchError {
    /// Numeric code reported to the caller.
    ///
    /// Registry failures keep their own code; everything rejected before
    /// reaching the registry is reported as 400.
    pub fn code(&self) -> u32 {
        match self {
            Self::Registry(e) => e.code(),
            _ => CODE_BAD_REQUEST,
        }
    }
}

/// Failures produced by snapshot persistence.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Snapshot {0} is locked by another process")]
    Locked(String),
}

/// Convenience Result alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
