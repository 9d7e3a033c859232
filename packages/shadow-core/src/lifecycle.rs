//! # Client Key Lifecycle
//!
//! Drives the local vault and the key registry together.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     CLIENT KEY STATE MACHINE                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   NoKey ── generate+register ──► Unlocked ◄──── unlock ────┐           │
//! │                                     │   ▲                   │           │
//! │                                     │   │ rotate            │           │
//! │                                lock │   └──────┐            │           │
//! │                                     ▼          │            │           │
//! │                                   Locked ──────┴────────────┘           │
//! │                                                                         │
//! │   Unlocked / Locked ── revoke ──► NoActiveKey                          │
//! │   NoActiveKey ── generate+register ──► Unlocked                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The state is derived from both sides each time it is read: the registry's
//! active key and whether this device's vault holds it.

use async_trait::async_trait;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::crypto::{sign_ownership, EncryptionKeyPair, SigningKeyPair};
use crate::error::{Error, Result};
use crate::registry::{KeyRegistration, KeyRegistry, UserEncryptionKey};
use crate::vault::{validate_password, LocalKeyVault, VaultState};

/// How the client reaches the key registry
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Register a key; returns its id
    async fn register(
        &self,
        address: &str,
        public_key_hex: &str,
        registration: KeyRegistration,
    ) -> Result<String>;

    /// Replace the active key; returns the new id
    async fn rotate(
        &self,
        address: &str,
        new_public_key_hex: &str,
        reason: Option<&str>,
        registration: KeyRegistration,
    ) -> Result<String>;

    /// Withdraw the active key
    async fn revoke(&self, address: &str, reason: Option<&str>) -> Result<()>;

    /// Current active key
    async fn get_active(&self, address: &str) -> Result<Option<UserEncryptionKey>>;
}

#[async_trait]
impl RegistryClient for KeyRegistry {
    async fn register(
        &self,
        address: &str,
        public_key_hex: &str,
        registration: KeyRegistration,
    ) -> Result<String> {
        KeyRegistry::register(self, address, public_key_hex, registration)
    }

    async fn rotate(
        &self,
        address: &str,
        new_public_key_hex: &str,
        reason: Option<&str>,
        registration: KeyRegistration,
    ) -> Result<String> {
        KeyRegistry::rotate(self, address, new_public_key_hex, reason, registration)
    }

    async fn revoke(&self, address: &str, reason: Option<&str>) -> Result<()> {
        KeyRegistry::revoke(self, address, reason)
    }

    async fn get_active(&self, address: &str) -> Result<Option<UserEncryptionKey>> {
        KeyRegistry::get_active(self, address)
    }
}

/// Where this device stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// This device holds no key that the registry considers active
    NoKey,
    /// The active key is stored here but encrypted
    Locked,
    /// The active key is decrypted and usable
    Unlocked,
    /// The key held here was revoked and nothing replaced it
    NoActiveKey,
}

/// Client-side coordinator for one account
pub struct KeyLifecycle {
    account: SigningKeyPair,
    vault: Arc<LocalKeyVault>,
    registry: Arc<dyn RegistryClient>,
    device_id: Option<String>,
}

impl KeyLifecycle {
    /// Coordinate `vault` and `registry` for the account behind `account`
    pub fn new(account: SigningKeyPair, vault: Arc<LocalKeyVault>, registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            account,
            vault,
            registry,
            device_id: None,
        }
    }

    /// Record this device id on every key registered from here
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// The account address
    pub fn address(&self) -> String {
        self.account.address()
    }

    /// The vault this lifecycle drives
    pub fn vault(&self) -> &Arc<LocalKeyVault> {
        &self.vault
    }

    fn registration_for(&self, keypair: &EncryptionKeyPair) -> KeyRegistration {
        KeyRegistration {
            signed_message: Some(sign_ownership(&self.account, &keypair.public_hex())),
            device_id: self.device_id.clone(),
            label: None,
        }
    }

    fn discard_staged(&self) {
        if let Err(e) = self.vault.discard_staged() {
            tracing::warn!(error = %e, "Staged key could not be discarded");
        }
    }

    /// Swap in a staged key the registry already holds as active.
    ///
    /// Covers a registration that committed while the vault write after it
    /// failed. The promoted record is left locked.
    fn recover_staged(&self, active_public_key: &str) -> Result<()> {
        let Some(staged) = self.vault.staged_public_key()? else {
            return Ok(());
        };
        if hex::encode(staged) != active_public_key || self.vault.public_key()? == Some(staged) {
            return Ok(());
        }

        self.vault.promote_staged(None)?;
        tracing::info!(address = %self.address(), "Recovered staged encryption key");
        Ok(())
    }

    /// Current state, from the registry and the vault.
    ///
    /// A staged key that the registry has already activated is promoted
    /// into the vault first.
    pub async fn state(&self) -> Result<KeyState> {
        let active = self.registry.get_active(&self.address()).await?;
        if let Some(active) = &active {
            self.recover_staged(&active.public_key)?;
        }
        let vault_state = self.vault.state()?;
        let local_key = self.vault.public_key()?.map(hex::encode);

        let state = match (active, vault_state) {
            (None, VaultState::NoKey) => KeyState::NoKey,
            (None, _) => KeyState::NoActiveKey,
            (Some(active), _) if Some(&active.public_key) != local_key.as_ref() => KeyState::NoKey,
            (Some(_), VaultState::Unlocked) => KeyState::Unlocked,
            (Some(_), _) => KeyState::Locked,
        };
        Ok(state)
    }

    /// Generate a keypair, register it and store it. Leaves the vault unlocked.
    ///
    /// Allowed from `NoKey` and `NoActiveKey`.
    pub async fn generate_and_register(&self, password: &str) -> Result<String> {
        match self.state().await? {
            KeyState::NoKey | KeyState::NoActiveKey => {}
            KeyState::Locked | KeyState::Unlocked => {
                return Err(Error::KeyAlreadyActive(self.address()));
            }
        }
        validate_password(password)?;

        let keypair = EncryptionKeyPair::generate();
        let registration = self.registration_for(&keypair);
        let address = self.address();

        // Durable before the registry advertises it
        self.vault.stage(&keypair, password)?;
        let id = match self
            .registry
            .register(&address, &keypair.public_hex(), registration)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.discard_staged();
                return Err(e);
            }
        };
        self.vault.promote_staged(Some(keypair))?;

        tracing::info!(address = %address, key_id = %id, "Encryption key generated and registered");
        Ok(id)
    }

    /// Lock the vault
    pub fn lock(&self) {
        self.vault.lock();
    }

    /// Unlock the vault
    pub async fn unlock(&self, password: &str) -> Result<()> {
        self.vault.unlock_async(Zeroizing::new(password.to_string())).await
    }

    /// Replace the active key with a fresh one. Leaves the vault unlocked
    /// with the new key.
    ///
    /// `password` must open the current vault record; the new key is stored
    /// under the same password.
    pub async fn rotate(&self, password: &str, reason: Option<&str>) -> Result<String> {
        let address = self.address();
        match self.state().await? {
            KeyState::Locked | KeyState::Unlocked => {}
            KeyState::NoKey | KeyState::NoActiveKey => return Err(Error::NoActiveKey(address)),
        }

        // Checked even when already unlocked; the new record reuses it
        self.unlock(password).await?;

        let keypair = EncryptionKeyPair::generate();
        let registration = self.registration_for(&keypair);
        self.vault.stage(&keypair, password)?;
        let id = match self
            .registry
            .rotate(&address, &keypair.public_hex(), reason, registration)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.discard_staged();
                return Err(e);
            }
        };
        self.vault.promote_staged(Some(keypair))?;

        tracing::info!(address = %address, key_id = %id, "Encryption key rotated");
        Ok(id)
    }

    /// Revoke the active key and lock the vault.
    pub async fn revoke(&self, reason: Option<&str>) -> Result<()> {
        let address = self.address();
        match self.state().await? {
            KeyState::Locked | KeyState::Unlocked => {}
            KeyState::NoKey | KeyState::NoActiveKey => return Err(Error::NoActiveKey(address)),
        }

        self.registry.revoke(&address, reason).await?;
        self.vault.lock();

        tracing::info!(address = %address, "Encryption key revoked");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
