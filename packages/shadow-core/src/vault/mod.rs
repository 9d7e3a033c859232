//! # Local Key Vault
//!
//! Client-side holder of the user's encryption keypair.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         VAULT STATES                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │            create / import                                             │
//! │   NoKey ─────────────────────► Unlocked ◄──────────┐                   │
//! │     ▲                             │                │ unlock(password)  │
//! │     │ delete                      │ lock           │                   │
//! │     │                             ▼                │                   │
//! │     └──────────────────────────  Locked ───────────┘                   │
//! │                                                                         │
//! │  Unlocked: decrypted keypair held in memory, zeroized on lock          │
//! │  Locked:   only the password-encrypted record exists                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The encrypted record is persisted through an injected [`SecretStore`].
//! Password derivation is slow; [`LocalKeyVault::unlock_async`] runs it on
//! tokio's blocking pool.

mod secure_store;
mod stored;

pub use secure_store::{names, FileSecretStore, MemorySecretStore, SecretStore};
pub use stored::{
    decrypt_private_key, decrypt_private_key_with, encrypt_private_key, export_key_pair,
    import_key_pair, load_key_pair, read_stored, record_salt, store_key_pair, write_stored,
    KeyBackup, StoredKeyPair, BACKUP_VERSION,
};

use parking_lot::RwLock;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::crypto::{derive, derive_key_from_password_async, EncryptionKeyPair, KdfParams};
use crate::error::{Error, Result};

/// Minimum password length in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Check a password against the minimum policy.
pub fn validate_password(password: &str) -> Result<()> {
    if password.trim().is_empty() {
        return Err(Error::WeakPassword("password cannot be empty or whitespace".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::WeakPassword(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Observable vault state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// Nothing stored
    NoKey,
    /// A record is stored but not decrypted
    Locked,
    /// The keypair is decrypted and usable
    Unlocked,
}

/// Password-protected local storage for one encryption keypair
pub struct LocalKeyVault {
    store: Arc<dyn SecretStore>,
    name: String,
    params: KdfParams,
    unlocked: RwLock<Option<Arc<EncryptionKeyPair>>>,
}

impl LocalKeyVault {
    /// Create a vault over `store` using the default record name
    pub fn new(store: Arc<dyn SecretStore>, params: KdfParams) -> Self {
        Self::with_name(store, names::ENCRYPTION_KEY_PAIR, params)
    }

    /// Create a vault over a specific record in `store`
    pub fn with_name(store: Arc<dyn SecretStore>, name: impl Into<String>, params: KdfParams) -> Self {
        Self {
            store,
            name: name.into(),
            params,
            unlocked: RwLock::new(None),
        }
    }

    /// Current state
    pub fn state(&self) -> Result<VaultState> {
        if self.unlocked.read().is_some() {
            return Ok(VaultState::Unlocked);
        }
        if self.store.exists(&self.name)? {
            Ok(VaultState::Locked)
        } else {
            Ok(VaultState::NoKey)
        }
    }

    /// Whether the keypair is currently decrypted
    pub fn is_unlocked(&self) -> bool {
        self.unlocked.read().is_some()
    }

    /// Public key of the stored record, readable while locked
    pub fn public_key(&self) -> Result<Option<[u8; 32]>> {
        Ok(read_stored(self.store.as_ref(), &self.name)?.map(|s| s.public_key))
    }

    // ========================================================================
    // CREATION
    // ========================================================================

    /// Generate and store a fresh keypair. The vault is left unlocked.
    pub fn create(&self, password: &str) -> Result<[u8; 32]> {
        self.create_with(EncryptionKeyPair::generate(), password)
    }

    /// Derive the keypair from a 32-byte seed and store it
    pub fn create_from_seed(&self, seed: &[u8], password: &str) -> Result<[u8; 32]> {
        self.create_with(derive(seed)?, password)
    }

    /// Store an existing keypair
    pub fn create_with(&self, keypair: EncryptionKeyPair, password: &str) -> Result<[u8; 32]> {
        validate_password(password)?;
        if self.store.exists(&self.name)? {
            return Err(Error::KeyAlreadyStored);
        }
        self.install(keypair, password)
    }

    /// Overwrite any stored keypair with `keypair`
    pub fn replace(&self, keypair: EncryptionKeyPair, password: &str) -> Result<[u8; 32]> {
        validate_password(password)?;
        self.install(keypair, password)
    }

    fn install(&self, keypair: EncryptionKeyPair, password: &str) -> Result<[u8; 32]> {
        let stored = store_key_pair(self.store.as_ref(), &self.name, &keypair, password, &self.params)?;
        *self.unlocked.write() = Some(Arc::new(keypair));

        tracing::info!(public_key = %stored.public_hex(), "Vault key stored");
        Ok(stored.public_key)
    }

    // ========================================================================
    // LOCK / UNLOCK
    // ========================================================================

    /// Decrypt the stored keypair with `password`
    pub fn unlock(&self, password: &str) -> Result<()> {
        let keypair = load_key_pair(self.store.as_ref(), &self.name, password)?;
        *self.unlocked.write() = Some(Arc::new(keypair));
        tracing::debug!("Vault unlocked");
        Ok(())
    }

    /// Like [`unlock`](Self::unlock), with the password derivation on the
    /// blocking pool.
    ///
    /// Dropping the future does not cancel a derivation that has already
    /// started.
    pub async fn unlock_async(&self, password: Zeroizing<String>) -> Result<()> {
        let stored = read_stored(self.store.as_ref(), &self.name)?.ok_or(Error::NoStoredKey)?;
        let key = derive_key_from_password_async(password, record_salt(&stored), stored.kdf).await?;
        let keypair = decrypt_private_key_with(&stored, &key)?;
        *self.unlocked.write() = Some(Arc::new(keypair));
        tracing::debug!("Vault unlocked");
        Ok(())
    }

    /// Drop the decrypted keypair
    pub fn lock(&self) {
        if self.unlocked.write().take().is_some() {
            tracing::debug!("Vault locked");
        }
    }

    /// Run `f` with the unlocked keypair.
    ///
    /// Returns `KeyNotLoaded` while locked.
    pub fn with_keypair<R>(&self, f: impl FnOnce(&EncryptionKeyPair) -> R) -> Result<R> {
        let guard = self.unlocked.read();
        let keypair = guard.as_ref().ok_or(Error::KeyNotLoaded)?;
        Ok(f(&**keypair))
    }

    /// Shared handle to the unlocked keypair
    pub fn keypair(&self) -> Result<Arc<EncryptionKeyPair>> {
        self.unlocked.read().clone().ok_or(Error::KeyNotLoaded)
    }

    // ========================================================================
    // STAGING
    // ========================================================================

    fn staged_name(&self) -> String {
        format!("{}.staged", self.name)
    }

    /// Persist `keypair` beside the current record without replacing it.
    ///
    /// Used when the new key must be durable before it is published
    /// elsewhere. [`promote_staged`](Self::promote_staged) swaps it in.
    pub fn stage(&self, keypair: &EncryptionKeyPair, password: &str) -> Result<[u8; 32]> {
        validate_password(password)?;
        let stored = store_key_pair(self.store.as_ref(), &self.staged_name(), keypair, password, &self.params)?;
        tracing::debug!(public_key = %stored.public_hex(), "Vault key staged");
        Ok(stored.public_key)
    }

    /// Public key of the staged record, if any
    pub fn staged_public_key(&self) -> Result<Option<[u8; 32]>> {
        Ok(read_stored(self.store.as_ref(), &self.staged_name())?.map(|s| s.public_key))
    }

    /// Make the staged record the vault's record.
    ///
    /// With `keypair` (which must match the staged record) the vault is left
    /// unlocked with it, otherwise locked. The staged record is removed only
    /// after the swap is written.
    pub fn promote_staged(&self, keypair: Option<EncryptionKeyPair>) -> Result<[u8; 32]> {
        let staged_name = self.staged_name();
        let stored = read_stored(self.store.as_ref(), &staged_name)?.ok_or(Error::NoStoredKey)?;
        if let Some(keypair) = &keypair {
            if keypair.public_bytes() != stored.public_key {
                return Err(Error::MalformedPayload("staged record does not match keypair".into()));
            }
        }

        write_stored(self.store.as_ref(), &self.name, &stored)?;
        *self.unlocked.write() = keypair.map(Arc::new);
        self.store.delete(&staged_name)?;

        tracing::info!(public_key = %stored.public_hex(), "Staged vault key promoted");
        Ok(stored.public_key)
    }

    /// Drop the staged record; returns whether there was one
    pub fn discard_staged(&self) -> Result<bool> {
        self.store.delete(&self.staged_name())
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Re-encrypt the stored keypair under a new password
    pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;
        let keypair = load_key_pair(self.store.as_ref(), &self.name, old_password)?;
        self.install(keypair, new_password)?;
        tracing::info!("Vault password changed");
        Ok(())
    }

    /// Remove the stored record and lock
    pub fn delete(&self) -> Result<bool> {
        self.lock();
        let removed = self.store.delete(&self.name)?;
        if removed {
            tracing::info!("Vault key deleted");
        }
        Ok(removed)
    }

    /// Export the stored record under a separate export password
    pub fn export(&self, export_password: &str) -> Result<KeyBackup> {
        validate_password(export_password)?;
        let stored = read_stored(self.store.as_ref(), &self.name)?.ok_or(Error::NoStoredKey)?;
        export_key_pair(&stored, export_password, &self.params)
    }

    /// Import a backup into an empty vault.
    ///
    /// The vault is left locked; unlock with the password the record was
    /// originally stored under.
    pub fn import(&self, backup: &KeyBackup, export_password: &str) -> Result<[u8; 32]> {
        if self.store.exists(&self.name)? {
            return Err(Error::KeyAlreadyStored);
        }
        let stored = import_key_pair(backup, export_password)?;
        write_stored(self.store.as_ref(), &self.name, &stored)?;
        self.lock();

        tracing::info!(public_key = %stored.public_hex(), "Vault key imported");
        Ok(stored.public_key)
    }
}

impl std::fmt::Debug for LocalKeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyVault")
            .field("name", &self.name)
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
