//! Registry records.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What happened to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    /// First key registered for an address
    Created,
    /// A new key replaced the active key
    Rotated,
    /// The active key was withdrawn with no replacement
    Revoked,
}

impl KeyAction {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAction::Created => "created",
            KeyAction::Rotated => "rotated",
            KeyAction::Revoked => "revoked",
        }
    }
}

impl std::str::FromStr for KeyAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(KeyAction::Created),
            "rotated" => Ok(KeyAction::Rotated),
            "revoked" => Ok(KeyAction::Revoked),
            other => Err(Error::DatabaseError(format!("unknown key action '{}'", other))),
        }
    }
}

impl std::fmt::Display for KeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered public encryption key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEncryptionKey {
    /// Row identifier (UUID)
    pub id: String,
    /// Owning account address
    pub address: String,
    /// X25519 public key, lowercase hex
    pub public_key: String,
    /// Ownership proof the key was registered with
    pub signed_message: Option<String>,
    /// Device the key lives on
    pub device_id: Option<String>,
    /// Human-readable label
    pub label: Option<String>,
    /// Whether this is the address' current key
    pub is_active: bool,
    /// Unix milliseconds
    pub created_at: i64,
    /// Unix milliseconds
    pub updated_at: i64,
}

/// One audit-trail entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyHistoryEntry {
    /// Account address
    pub address: String,
    /// Key the action applies to
    pub public_key: String,
    /// What happened
    pub action: KeyAction,
    /// Caller-supplied reason
    pub reason: Option<String>,
    /// Key that was active before a rotation
    pub previous_public_key: Option<String>,
    /// Unix milliseconds
    pub timestamp: i64,
}

/// Everything one registry transition writes, applied atomically by a
/// [`KeyStore`](super::KeyStore).
#[derive(Debug, Clone)]
pub struct KeyTransition {
    /// Address the transition applies to
    pub address: String,
    /// Set the current active row inactive first
    pub deactivate_current: bool,
    /// Row to insert as the new active key
    pub insert: Option<UserEncryptionKey>,
    /// Audit entry to append
    pub history: KeyHistoryEntry,
}
