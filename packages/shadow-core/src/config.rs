//! Configuration for Shadow Core.
//!
//! ```json
//! {
//!   "kdf": { "memory_kib": 65536, "iterations": 3, "parallelism": 1 },
//!   "registry": {
//!     "database_path": "/var/lib/shadow/registry.db",
//!     "allow_unverified_registration": false
//!   }
//! }
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use serde::{Deserialize, Serialize};

use crate::crypto::KdfParams;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Argon2id cost for new vault records and backups
    pub kdf: KdfParams,
    /// Key registry settings
    pub registry: RegistryConfig,
}

impl ShadowConfig {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::SerializationError(format!("Invalid config: {}", e)))?;
        config.kdf.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }
}

/// Key registry settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// SQLite file; `None` keeps the registry in an in-memory database
    pub database_path: Option<String>,

    /// Accept registrations that carry no ownership proof.
    ///
    /// Intended for local development only. Proofs that are supplied are
    /// always verified regardless of this flag.
    pub allow_unverified_registration: bool,
}
