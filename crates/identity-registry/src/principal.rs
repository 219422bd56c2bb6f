//! Principals — opaque caller/account identifiers.

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// An opaque caller or account identifier.
///
/// The registry keys records by exact string equality; no checksum or
/// address format is imposed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(pub String);

impl Principal {
    /// Wrap a trusted identifier without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse an untrusted identifier.
    ///
    /// Rejects the empty string and anything containing whitespace or
    /// control characters.
    pub fn parse(id: &str) -> Result<Self, DispatchError> {
        if id.is_empty() {
            return Err(DispatchError::InvalidPrincipal("empty principal".into()));
        }
        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DispatchError::InvalidPrincipal(format!(
                "principal contains whitespace or control characters: {id:?}"
            )));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
