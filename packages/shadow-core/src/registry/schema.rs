//! # Registry Schema
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         REGISTRY SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────┐          ┌──────────────────────┐            │
//! │  │ user_encryption_keys │          │ key_history          │            │
//! │  ├──────────────────────┤          ├──────────────────────┤            │
//! │  │ id                   │          │ id (autoincrement)   │            │
//! │  │ address              │◄─────────│ address              │            │
//! │  │ public_key           │          │ public_key           │            │
//! │  │ signed_message       │          │ action               │            │
//! │  │ device_id            │          │ reason               │            │
//! │  │ label                │          │ previous_public_key  │            │
//! │  │ is_active            │          │ timestamp            │            │
//! │  │ created_at           │          └──────────────────────┘            │
//! │  │ updated_at           │                                              │
//! │  └──────────────────────┘                                              │
//! │                                                                         │
//! │  UNIQUE (address) WHERE is_active = 1                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Registered encryption keys, one row per key ever registered
CREATE TABLE IF NOT EXISTS user_encryption_keys (
    id TEXT PRIMARY KEY,
    -- Account address (hex Ed25519 public key)
    address TEXT NOT NULL,
    -- X25519 public key (hex encoded, 64 chars)
    public_key TEXT NOT NULL,
    -- Ownership proof (hex signature), NULL when registered unverified
    signed_message TEXT,
    device_id TEXT,
    label TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_keys_address ON user_encryption_keys(address, created_at);

-- At most one active key per address
CREATE UNIQUE INDEX IF NOT EXISTS idx_keys_one_active
    ON user_encryption_keys(address) WHERE is_active = 1;

-- Append-only audit trail
CREATE TABLE IF NOT EXISTS key_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL,
    public_key TEXT NOT NULL,
    -- created | rotated | revoked
    action TEXT NOT NULL,
    reason TEXT,
    previous_public_key TEXT,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_address ON key_history(address, timestamp, id);
"#;
