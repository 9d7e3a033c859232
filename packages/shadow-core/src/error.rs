//! # Error Handling
//!
//! Error types for Shadow Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Key Derivation Errors (200-299)                                   │
//! │  │   ├── InvalidSeedLength     - Seed is not 32 bytes                  │
//! │  │   └── KeyDerivationFailed   - HKDF / Argon2 failure                 │
//! │  │                                                                      │
//! │  ├── Crypto Errors (300-399)                                           │
//! │  │   ├── EncryptionFailed      - AEAD encryption failed                │
//! │  │   ├── DecryptionFailed      - Wrong key or tampering                │
//! │  │   ├── InvalidKeyLength      - Key is not 32 bytes                   │
//! │  │   ├── SignatureInvalid      - Ownership proof rejected              │
//! │  │   └── OwnershipProofMissing - No proof and unverified not allowed   │
//! │  │                                                                      │
//! │  ├── Vault Errors (400-499)                                            │
//! │  │   ├── KeyNotLoaded          - Vault is locked                       │
//! │  │   ├── InvalidPassword       - Stored key did not open               │
//! │  │   └── WeakPassword          - Password policy violated              │
//! │  │                                                                      │
//! │  ├── Registry Errors (500-599)                                         │
//! │  │   ├── NoActiveKey           - Address has no active key             │
//! │  │   └── KeyAlreadyActive      - Key is already the active key         │
//! │  │                                                                      │
//! │  └── Content & Storage Errors (600-699)                                │
//! │      ├── MalformedPayload      - Bundle does not parse                 │
//! │      ├── StorageUnavailable    - External store is down                │
//! │      └── DatabaseError         - SQLite failure                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//!
//! `DecryptionFailed` and `SignatureInvalid` are terminal: retrying with the
//! same inputs cannot succeed. `InvalidPassword` and `KeyNotLoaded` are
//! surfaced so the caller can prompt for a password. `StorageUnavailable` is
//! reported as-is; retry and back-off belong to the caller.

use thiserror::Error;

/// Result type alias for Shadow Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Shadow Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Key Derivation Errors (200-299)
    // ========================================================================

    /// The seed handed to key derivation was not 32 bytes
    #[error("Invalid seed length: expected 32 bytes, got {0}")]
    InvalidSeedLength(usize),

    /// Key derivation failed
    #[error("Failed to derive key: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authenticated decryption failed (wrong key or tampered data)
    #[error("Decryption failed: wrong key or tampered data")]
    DecryptionFailed,

    /// A key did not have the expected length
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// The ownership proof did not verify against the address
    #[error("Ownership signature is invalid")]
    SignatureInvalid,

    /// No ownership proof was supplied and unverified registration is disabled
    #[error("Ownership proof required for address {0}")]
    OwnershipProofMissing(String),

    /// The account address could not be decoded
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // ========================================================================
    // Vault Errors (400-499)
    // ========================================================================

    /// The local vault is locked; a password is needed
    #[error("Encryption key not loaded. Unlock the vault first.")]
    KeyNotLoaded,

    /// Nothing has been stored in the vault slot
    #[error("No stored key pair")]
    NoStoredKey,

    /// A key pair is already stored in the vault slot
    #[error("A key pair is already stored. Delete or replace it first.")]
    KeyAlreadyStored,

    /// The password did not open the stored key
    #[error("Invalid password")]
    InvalidPassword,

    /// The password does not meet the minimum policy
    #[error("Weak password: {0}")]
    WeakPassword(String),

    // ========================================================================
    // Registry Errors (500-599)
    // ========================================================================

    /// The address has no active encryption key
    #[error("No active encryption key for {0}")]
    NoActiveKey(String),

    /// The key is already the active key for the address
    #[error("Key is already active for {0}")]
    KeyAlreadyActive(String),

    // ========================================================================
    // Content & Storage Errors (600-699)
    // ========================================================================

    /// A ciphertext bundle or payload could not be parsed
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// An external storage collaborator is unreachable
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The content store has no entry for the identifier
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    /// Unknown content source discriminant
    #[error("Invalid content source: {0}")]
    InvalidSource(u8),

    /// Content identifier exceeds the ledger bound
    #[error("Content identifier too long: {0} bytes")]
    CidTooLong(usize),

    /// Wrapped key exceeds the ledger bound
    #[error("Encrypted key too long: {0} bytes")]
    KeyTooLong(usize),

    /// Metadata exceeds the ledger bound
    #[error("Metadata too long: {0} bytes")]
    MetadataTooLong(usize),

    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Numeric error code, grouped by category:
    /// - 200-299: Key derivation
    /// - 300-399: Crypto
    /// - 400-499: Vault
    /// - 500-599: Registry
    /// - 600-699: Content & storage
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidSeedLength(_) => 200,
            Error::KeyDerivationFailed(_) => 201,

            Error::EncryptionFailed(_) => 300,
            Error::DecryptionFailed => 301,
            Error::InvalidKeyLength { .. } => 302,
            Error::SignatureInvalid => 303,
            Error::OwnershipProofMissing(_) => 304,
            Error::InvalidAddress(_) => 305,

            Error::KeyNotLoaded => 400,
            Error::NoStoredKey => 401,
            Error::KeyAlreadyStored => 402,
            Error::InvalidPassword => 403,
            Error::WeakPassword(_) => 404,

            Error::NoActiveKey(_) => 500,
            Error::KeyAlreadyActive(_) => 501,

            Error::MalformedPayload(_) => 600,
            Error::StorageUnavailable(_) => 601,
            Error::ContentNotFound(_) => 602,
            Error::InvalidSource(_) => 603,
            Error::CidTooLong(_) => 604,
            Error::KeyTooLong(_) => 605,
            Error::MetadataTooLong(_) => 606,
            Error::StorageReadError(_) => 607,
            Error::StorageWriteError(_) => 608,
            Error::DatabaseError(_) => 609,

            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
        }
    }

    /// Terminal errors must not be retried with the same inputs.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::DecryptionFailed | Error::SignatureInvalid)
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors can be resolved by retrying later or by
    /// user action (re-entering a password, unlocking the vault).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidPassword | Error::KeyNotLoaded | Error::StorageUnavailable(_)
        )
    }

    /// Check if this error requires user action
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::KeyNotLoaded | Error::InvalidPassword | Error::WeakPassword(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageReadError(err.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::MalformedPayload(format!("invalid hex: {}", err))
    }
}

// ============================================================================
// TESTS
// ============================================================================
