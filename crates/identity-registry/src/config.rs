//! Runtime configuration shared by the CLI and the JSON-RPC server.
//!
//! Defaults can be overridden through the environment:
//!
//! | Variable            | Field               | Default             |
//! |---------------------|---------------------|---------------------|
//! | `IDREG_HOME`        | `data_dir`          | `$HOME/.idreg`      |
//! | `IDREG_CONTRACT`    | `contract_name`     | `identity-registry` |
//! | `IDREG_MAX_PAYLOAD` | `max_payload_bytes` | `1024`              |

use std::path::PathBuf;

/// Contract name the dispatcher answers to by default.
pub const DEFAULT_CONTRACT_NAME: &str = "identity-registry";

/// Largest payload accepted by the dispatcher by default.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024;

/// Number of calls the dispatcher journal keeps by default.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 256;

const SNAPSHOT_FILE_NAME: &str = "registry.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Name callers must address.
    pub contract_name: String,
    /// Directory holding the registry snapshot.
    pub data_dir: PathBuf,
    /// Upper bound on payload size at the dispatch boundary.
    pub max_payload_bytes: usize,
    /// Calls retained in the dispatcher journal.
    pub journal_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            contract_name: DEFAULT_CONTRACT_NAME.to_string(),
            data_dir: default_data_dir(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }
}

impl RegistryConfig {
    /// Defaults overlaid with `IDREG_*` environment variables.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("IDREG_HOME").filter(|v| !v.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup("IDREG_CONTRACT").filter(|v| !v.is_empty()) {
            config.contract_name = name;
        }
        if let Some(raw) = lookup("IDREG_MAX_PAYLOAD") {
            match raw.parse() {
                Ok(n) => config.max_payload_bytes = n,
                Err(_) => log::warn!("ignoring IDREG_MAX_PAYLOAD={raw:?}: not a byte count"),
            }
        }

        config
    }

    /// Location of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE_NAME)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".idreg")
}
