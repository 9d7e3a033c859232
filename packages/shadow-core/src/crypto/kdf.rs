//! # Key Derivation Functions
//!
//! Two families of derivation live here:
//!
//! 1. **Seed expansion** (HKDF-SHA256): the user's 32-byte account seed is
//!    expanded into independent signing and encryption keys using distinct
//!    `info` strings.
//! 2. **Password stretching** (Argon2id): a password and a per-record salt
//!    are turned into the 32-byte key that protects the private key at rest.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         KEY DERIVATION                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Account Seed (32 bytes)                                               │
//! │        │                                                                │
//! │        ├──► HKDF(info="shadow-signing-key-v1")    → Ed25519 seed        │
//! │        │                                                                │
//! │        └──► HKDF(info="shadow-encryption-key-v1") → X25519 scalar       │
//! │                                                                         │
//! │  Password + Salt (16 bytes)                                            │
//! │        │                                                                │
//! │        └──► Argon2id(m, t, p)                     → Vault key           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! | Aspect | Design Choice |
//! |--------|---------------|
//! | Seed expansion | HKDF-SHA256 with versioned `info` strings |
//! | Password KDF | Argon2id, memory-hard, tunable via [`KdfParams`] |
//! | Salt | 16 random bytes, fresh for every stored record |

use argon2::Argon2;
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of a password salt in bytes
pub const SALT_SIZE: usize = 16;

/// Size of a password-derived key in bytes
pub const PASSWORD_KEY_SIZE: usize = 32;

/// Domain separation strings for HKDF
///
/// Keys derived for different purposes from the same seed are
/// cryptographically independent.
pub mod domain {
    /// Domain for account (Ed25519) key derivation
    pub const SIGNING_KEY: &[u8] = b"shadow-signing-key-v1";

    /// Domain for encryption (X25519) key derivation
    pub const ENCRYPTION_KEY: &[u8] = b"shadow-encryption-key-v1";
}

/// Keys derived from an account seed
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeys {
    /// Ed25519 signing key seed (32 bytes)
    pub signing_key: [u8; 32],

    /// X25519 secret scalar (32 bytes)
    pub encryption_key: [u8; 32],
}

/// Derive signing and encryption key material from an account seed.
///
/// Deterministic: the same seed always yields the same keys.
pub fn derive_keys_from_seed(seed: &[u8; 32]) -> Result<DerivedKeys> {
    let hkdf = Hkdf::<Sha256>::new(None, seed);

    let mut signing_key = [0u8; 32];
    hkdf.expand(domain::SIGNING_KEY, &mut signing_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive signing key".into()))?;

    let mut encryption_key = [0u8; 32];
    hkdf.expand(domain::ENCRYPTION_KEY, &mut encryption_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive encryption key".into()))?;

    Ok(DerivedKeys {
        signing_key,
        encryption_key,
    })
}

/// Derive only the X25519 scalar from a seed.
pub fn derive_encryption_scalar(seed: &[u8; 32]) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(None, seed);

    let mut scalar = [0u8; 32];
    hkdf.expand(domain::ENCRYPTION_KEY, &mut scalar)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive encryption key".into()))?;

    Ok(scalar)
}

// ============================================================================
// PASSWORD-BASED DERIVATION
// ============================================================================

/// Argon2id cost parameters.
///
/// Defaults follow the common interactive profile: 64 MiB, 3 passes, one
/// lane. Lower values are only appropriate for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

/// Largest accepted memory cost (1 GiB)
pub const MAX_KDF_MEMORY_KIB: u32 = 1024 * 1024;

/// Largest accepted pass count
pub const MAX_KDF_ITERATIONS: u32 = 16;

/// Largest accepted lane count
pub const MAX_KDF_PARALLELISM: u32 = 8;

impl KdfParams {
    /// Reject costs above the fixed ceilings.
    ///
    /// Parameters travel inside stored records and backups, so they are
    /// checked before any derivation allocates.
    pub fn validate(&self) -> Result<()> {
        if self.memory_kib > MAX_KDF_MEMORY_KIB {
            return Err(Error::MalformedPayload(format!(
                "kdf memory {} KiB exceeds {} KiB",
                self.memory_kib, MAX_KDF_MEMORY_KIB
            )));
        }
        if self.iterations > MAX_KDF_ITERATIONS {
            return Err(Error::MalformedPayload(format!(
                "kdf iterations {} exceed {}",
                self.iterations, MAX_KDF_ITERATIONS
            )));
        }
        if self.parallelism > MAX_KDF_PARALLELISM {
            return Err(Error::MalformedPayload(format!(
                "kdf parallelism {} exceeds {}",
                self.parallelism, MAX_KDF_PARALLELISM
            )));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// A random salt for password derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generate a fresh random salt
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap existing salt bytes
    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

/// A 256-bit key stretched from a password.
///
/// Zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PasswordKey([u8; PASSWORD_KEY_SIZE]);

impl PasswordKey {
    /// Get the raw key bytes.
    ///
    /// Use only for immediate encryption operations; never store or log.
    pub fn as_bytes(&self) -> &[u8; PASSWORD_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for PasswordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PasswordKey").field(&"[REDACTED]").finish()
    }
}

/// Derive a vault key from a password and salt using Argon2id.
///
/// Deliberately slow. Interactive callers should run it on a blocking
/// thread (see [`derive_key_from_password_async`]).
pub fn derive_key_from_password(password: &str, salt: &Salt, params: &KdfParams) -> Result<PasswordKey> {
    params.validate()?;
    let argon_params = argon2::Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(PASSWORD_KEY_SIZE),
    )
    .map_err(|e| Error::KeyDerivationFailed(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, argon_params);

    let mut key = [0u8; PASSWORD_KEY_SIZE];
    argon2
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key)
        .map_err(|e| Error::KeyDerivationFailed(format!("Argon2 failed: {}", e)))?;

    let derived = PasswordKey(key);
    key.zeroize();
    Ok(derived)
}

/// Run [`derive_key_from_password`] on tokio's blocking pool.
///
/// The derivation has no cancellation point; once started it always
/// completes.
pub async fn derive_key_from_password_async(
    password: zeroize::Zeroizing<String>,
    salt: Salt,
    params: KdfParams,
) -> Result<PasswordKey> {
    tokio::task::spawn_blocking(move || derive_key_from_password(&password, &salt, &params))
        .await
        .map_err(|e| Error::Internal(format!("Key derivation task failed: {}", e)))?
}

// ============================================================================
// TESTS
// ============================================================================
