//! # Key Registry
//!
//! Server-side record of which encryption key is current for each account,
//! with an append-only audit trail.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        KEY LIFECYCLE                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  register(A, K1) ──► K1 active          history: created(K1)           │
//! │        │                                                                │
//! │  rotate(A, K2)   ──► K1 inactive        history: rotated(K2, prev=K1)  │
//! │        │             K2 active                                         │
//! │        │                                                                │
//! │  revoke(A)       ──► K2 inactive        history: revoked(K2)           │
//! │                      no active key                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Each transition reads the current active key and commits one
//! [`KeyTransition`] while holding a lock for that address. Calls for
//! different addresses take different locks and never contend. The store
//! applies each transition atomically.
//!
//! ## Ownership Proofs
//!
//! A supplied proof is always verified through the configured
//! [`OwnershipVerifier`]. A missing proof is rejected with
//! `OwnershipProofMissing` unless `allow_unverified_registration` is set.

mod schema;
mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteKeyStore;
pub use store::{KeyStore, MemoryKeyStore};
pub use types::{KeyAction, KeyHistoryEntry, KeyTransition, UserEncryptionKey};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::crypto::{decode_public_key, Ed25519OwnershipVerifier, OwnershipVerifier};
use crate::error::{Error, Result};
use crate::time::now_timestamp_millis;

/// Optional fields attached to a newly registered key
#[derive(Debug, Clone, Default)]
pub struct KeyRegistration {
    /// Hex ownership proof over `ownership_message(address, public_key)`
    pub signed_message: Option<String>,
    /// Device the key lives on
    pub device_id: Option<String>,
    /// Human-readable label
    pub label: Option<String>,
}

impl KeyRegistration {
    /// Registration carrying an ownership proof
    pub fn signed(signature_hex: impl Into<String>) -> Self {
        Self {
            signed_message: Some(signature_hex.into()),
            ..Default::default()
        }
    }

    /// Builder: set the device id
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Builder: set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Shared lock for one address; the map entry goes away with the last lease
struct AddressLock<'a> {
    locks: &'a Mutex<HashMap<String, Arc<Mutex<()>>>>,
    address: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for AddressLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // Leases are only handed out under the map lock, so the count is stable here
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.address);
        }
    }
}

/// The key registry
pub struct KeyRegistry {
    store: Arc<dyn KeyStore>,
    verifier: Arc<dyn OwnershipVerifier>,
    allow_unverified: bool,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyRegistry {
    /// Build a registry over an explicit store and verifier
    pub fn new(
        store: Arc<dyn KeyStore>,
        verifier: Arc<dyn OwnershipVerifier>,
        config: &RegistryConfig,
    ) -> Self {
        if config.allow_unverified_registration {
            tracing::warn!("Key registry accepts registrations without ownership proof");
        }
        Self {
            store,
            verifier,
            allow_unverified: config.allow_unverified_registration,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Open a SQLite-backed registry with Ed25519 ownership verification
    pub fn open(config: &RegistryConfig) -> Result<Self> {
        let store = SqliteKeyStore::open(config.database_path.as_deref())?;
        Ok(Self::new(Arc::new(store), Arc::new(Ed25519OwnershipVerifier), config))
    }

    /// In-memory registry with Ed25519 ownership verification
    pub fn in_memory(config: &RegistryConfig) -> Self {
        Self::new(
            Arc::new(MemoryKeyStore::new()),
            Arc::new(Ed25519OwnershipVerifier),
            config,
        )
    }

    fn address_lock(&self, address: &str) -> AddressLock<'_> {
        let lock = self.locks.lock().entry(address.to_string()).or_default().clone();
        AddressLock {
            locks: &self.locks,
            address: address.to_string(),
            lock,
        }
    }

    #[cfg(test)]
    fn tracked_addresses(&self) -> usize {
        self.locks.lock().len()
    }

    fn check_address(address: &str) -> Result<()> {
        if address.trim().is_empty() {
            return Err(Error::InvalidAddress("address cannot be empty".into()));
        }
        Ok(())
    }

    /// Validate length and normalize to lowercase hex
    fn normalize_public_key(public_key_hex: &str) -> Result<String> {
        Ok(hex::encode(decode_public_key(public_key_hex)?))
    }

    fn check_proof(&self, address: &str, public_key_hex: &str, proof: Option<&str>) -> Result<()> {
        match proof {
            Some(signature) => self.verifier.verify(address, public_key_hex, signature),
            None if self.allow_unverified => {
                tracing::warn!(address = %address, "Registering key without ownership proof");
                Ok(())
            }
            None => Err(Error::OwnershipProofMissing(address.to_string())),
        }
    }

    fn new_row(address: &str, public_key: &str, registration: KeyRegistration, now: i64) -> UserEncryptionKey {
        UserEncryptionKey {
            id: uuid::Uuid::new_v4().to_string(),
            address: address.to_string(),
            public_key: public_key.to_string(),
            signed_message: registration.signed_message,
            device_id: registration.device_id,
            label: registration.label,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Install `public_key` as the active key, replacing any current one.
    fn install(
        &self,
        address: &str,
        public_key_hex: &str,
        registration: KeyRegistration,
        reason: Option<String>,
        require_active: bool,
    ) -> Result<String> {
        Self::check_address(address)?;
        let public_key = Self::normalize_public_key(public_key_hex)?;
        self.check_proof(address, &public_key, registration.signed_message.as_deref())?;

        let lease = self.address_lock(address);
        let _guard = lease.lock.lock();

        let current = self.store.active(address)?;
        match &current {
            Some(active) if active.public_key == public_key => {
                return Err(Error::KeyAlreadyActive(address.to_string()));
            }
            None if require_active => return Err(Error::NoActiveKey(address.to_string())),
            _ => {}
        }

        let now = now_timestamp_millis();
        let row = Self::new_row(address, &public_key, registration, now);
        let id = row.id.clone();
        let previous = current.map(|k| k.public_key);
        let action = if previous.is_some() {
            KeyAction::Rotated
        } else {
            KeyAction::Created
        };

        self.store.commit(&KeyTransition {
            address: address.to_string(),
            deactivate_current: previous.is_some(),
            insert: Some(row),
            history: KeyHistoryEntry {
                address: address.to_string(),
                public_key: public_key.clone(),
                action,
                reason,
                previous_public_key: previous,
                timestamp: now,
            },
        })?;

        tracing::info!(address = %address, public_key = %public_key, action = %action, "Encryption key installed");
        Ok(id)
    }

    /// Register a key for `address`.
    ///
    /// If a key is already active it is replaced and the history records a
    /// rotation. Returns the new key id.
    pub fn register(
        &self,
        address: &str,
        public_key_hex: &str,
        registration: KeyRegistration,
    ) -> Result<String> {
        self.install(address, public_key_hex, registration, None, false)
    }

    /// Replace the active key. Fails with `NoActiveKey` if there is none.
    pub fn rotate(
        &self,
        address: &str,
        new_public_key_hex: &str,
        reason: Option<&str>,
        registration: KeyRegistration,
    ) -> Result<String> {
        self.install(
            address,
            new_public_key_hex,
            registration,
            reason.map(str::to_string),
            true,
        )
    }

    /// Deactivate the active key without a replacement.
    pub fn revoke(&self, address: &str, reason: Option<&str>) -> Result<()> {
        Self::check_address(address)?;

        let lease = self.address_lock(address);
        let _guard = lease.lock.lock();

        let current = self
            .store
            .active(address)?
            .ok_or_else(|| Error::NoActiveKey(address.to_string()))?;

        let now = now_timestamp_millis();
        self.store.commit(&KeyTransition {
            address: address.to_string(),
            deactivate_current: true,
            insert: None,
            history: KeyHistoryEntry {
                address: address.to_string(),
                public_key: current.public_key.clone(),
                action: KeyAction::Revoked,
                reason: reason.map(str::to_string),
                previous_public_key: None,
                timestamp: now,
            },
        })?;

        tracing::info!(address = %address, public_key = %current.public_key, "Encryption key revoked");
        Ok(())
    }

    /// The active key for `address`
    pub fn get_active(&self, address: &str) -> Result<Option<UserEncryptionKey>> {
        self.store.active(address)
    }

    /// Audit trail for `address`, oldest first
    pub fn history(&self, address: &str) -> Result<Vec<KeyHistoryEntry>> {
        self.store.history(address)
    }

    /// All keys ever registered for `address`, newest first
    pub fn keys(&self, address: &str) -> Result<Vec<UserEncryptionKey>> {
        self.store.keys(address)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{sign_ownership, EncryptionKeyPair, SigningKeyPair};

    fn strict() -> RegistryConfig {
        RegistryConfig::default()
    }

    fn lenient() -> RegistryConfig {
        RegistryConfig {
            allow_unverified_registration: true,
            ..Default::default()
        }
    }

    fn registries(config: &RegistryConfig) -> Vec<KeyRegistry> {
        vec![
            KeyRegistry::in_memory(config),
            KeyRegistry::open(config).unwrap(),
        ]
    }

    fn new_key() -> String {
        EncryptionKeyPair::generate().public_hex()
    }

    #[test]
    fn test_lifecycle_scenario() {
        for registry in registries(&lenient()) {
            let address = "account-a";
            let (k1, k2, k3) = (new_key(), new_key(), new_key());

            registry.register(address, &k1, KeyRegistration::default()).unwrap();
            registry
                .rotate(address, &k2, Some("lost device"), KeyRegistration::default())
                .unwrap();
            registry
                .rotate(address, &k3, Some("routine"), KeyRegistration::default())
                .unwrap();
            registry.revoke(address, Some("offboarding")).unwrap();

            assert!(registry.get_active(address).unwrap().is_none());

            let history = registry.history(address).unwrap();
            let summary: Vec<_> = history
                .iter()
                .map(|h| (h.action, h.public_key.clone(), h.previous_public_key.clone()))
                .collect();
            assert_eq!(
                summary,
                vec![
                    (KeyAction::Created, k1.clone(), None),
                    (KeyAction::Rotated, k2.clone(), Some(k1.clone())),
                    (KeyAction::Rotated, k3.clone(), Some(k2.clone())),
                    (KeyAction::Revoked, k3.clone(), None),
                ]
            );
            assert_eq!(history[1].reason.as_deref(), Some("lost device"));
            assert_eq!(history[2].reason.as_deref(), Some("routine"));
            assert_eq!(history[3].reason.as_deref(), Some("offboarding"));

            let keys = registry.keys(address).unwrap();
            assert_eq!(keys.len(), 3);
            assert!(keys.iter().all(|k| !k.is_active));
        }
    }

    #[test]
    fn test_n_rotations_single_active() {
        for registry in registries(&lenient()) {
            let address = "account-n";
            let n = 10;

            registry.register(address, &new_key(), KeyRegistration::default()).unwrap();
            let mut last = String::new();
            for _ in 0..n {
                last = new_key();
                registry.rotate(address, &last, None, KeyRegistration::default()).unwrap();
            }

            let active: Vec<_> = registry
                .keys(address)
                .unwrap()
                .into_iter()
                .filter(|k| k.is_active)
                .collect();
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].public_key, last);
            assert_eq!(registry.get_active(address).unwrap().unwrap().public_key, last);

            let history = registry.history(address).unwrap();
            assert_eq!(history.len(), n + 1);
            assert_eq!(history[0].action, KeyAction::Created);
            assert!(history[1..].iter().all(|h| h.action == KeyAction::Rotated));
            assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }

    #[test]
    fn test_concurrent_rotations_same_address() {
        for registry in registries(&lenient()) {
            let address = "account-c";
            registry.register(address, &new_key(), KeyRegistration::default()).unwrap();

            let threads = 8;
            let per_thread = 5;
            std::thread::scope(|scope| {
                for _ in 0..threads {
                    scope.spawn(|| {
                        for _ in 0..per_thread {
                            registry
                                .rotate(address, &new_key(), None, KeyRegistration::default())
                                .unwrap();
                        }
                    });
                }
            });

            let active = registry
                .keys(address)
                .unwrap()
                .into_iter()
                .filter(|k| k.is_active)
                .count();
            assert_eq!(active, 1);
            assert_eq!(registry.history(address).unwrap().len(), 1 + threads * per_thread);
            assert_eq!(registry.tracked_addresses(), 0);
        }
    }

    #[test]
    fn test_address_locks_released() {
        let registry = KeyRegistry::in_memory(&lenient());
        for i in 0..500 {
            let address = format!("account-{}", i);
            let key = new_key();
            registry.register(&address, &key, KeyRegistration::default()).unwrap();
            // Both fail while holding the address lock
            assert!(matches!(
                registry.rotate(&address, &key, None, KeyRegistration::default()),
                Err(Error::KeyAlreadyActive(_))
            ));
            assert!(matches!(
                registry.revoke(&format!("never-registered-{}", i), None),
                Err(Error::NoActiveKey(_))
            ));
        }
        assert_eq!(registry.tracked_addresses(), 0);
    }

    #[test]
    fn test_addresses_are_independent() {
        let registry = KeyRegistry::in_memory(&lenient());
        registry.register("a", &new_key(), KeyRegistration::default()).unwrap();
        registry.register("b", &new_key(), KeyRegistration::default()).unwrap();
        registry.revoke("a", None).unwrap();

        assert!(registry.get_active("a").unwrap().is_none());
        assert!(registry.get_active("b").unwrap().is_some());
        assert_eq!(registry.history("b").unwrap().len(), 1);
    }

    #[test]
    fn test_register_over_active_records_rotation() {
        let registry = KeyRegistry::in_memory(&lenient());
        let (k1, k2) = (new_key(), new_key());
        registry.register("a", &k1, KeyRegistration::default()).unwrap();
        registry.register("a", &k2, KeyRegistration::default()).unwrap();

        let history = registry.history("a").unwrap();
        assert_eq!(history[1].action, KeyAction::Rotated);
        assert_eq!(history[1].previous_public_key.as_deref(), Some(k1.as_str()));
    }

    #[test]
    fn test_public_key_validation() {
        let registry = KeyRegistry::in_memory(&lenient());

        let short = hex::encode([1u8; 31]);
        assert!(matches!(
            registry.register("a", &short, KeyRegistration::default()),
            Err(Error::InvalidKeyLength { expected: 32, actual: 31 })
        ));
        assert!(matches!(
            registry.register("a", "xyz", KeyRegistration::default()),
            Err(Error::MalformedPayload(_))
        ));
        assert!(registry.history("a").unwrap().is_empty());
    }

    #[test]
    fn test_public_key_normalized_to_lowercase() {
        let registry = KeyRegistry::in_memory(&lenient());
        let key = new_key();
        registry.register("a", &key.to_uppercase(), KeyRegistration::default()).unwrap();
        assert_eq!(registry.get_active("a").unwrap().unwrap().public_key, key);

        assert!(matches!(
            registry.register("a", &key, KeyRegistration::default()),
            Err(Error::KeyAlreadyActive(_))
        ));
    }

    #[test]
    fn test_rotate_and_revoke_require_active_key() {
        let registry = KeyRegistry::in_memory(&lenient());
        assert!(matches!(
            registry.rotate("a", &new_key(), None, KeyRegistration::default()),
            Err(Error::NoActiveKey(_))
        ));
        assert!(matches!(registry.revoke("a", None), Err(Error::NoActiveKey(_))));

        registry.register("a", &new_key(), KeyRegistration::default()).unwrap();
        registry.revoke("a", None).unwrap();
        assert!(matches!(registry.revoke("a", None), Err(Error::NoActiveKey(_))));
    }

    #[test]
    fn test_proof_required_by_default() {
        let registry = KeyRegistry::in_memory(&strict());
        let account = SigningKeyPair::generate();
        let key = new_key();

        assert!(matches!(
            registry.register(&account.address(), &key, KeyRegistration::default()),
            Err(Error::OwnershipProofMissing(_))
        ));

        let proof = sign_ownership(&account, &key);
        let registration = KeyRegistration::signed(proof.clone())
            .with_device("laptop")
            .with_label("work");
        registry.register(&account.address(), &key, registration).unwrap();

        let active = registry.get_active(&account.address()).unwrap().unwrap();
        assert_eq!(active.signed_message.as_deref(), Some(proof.as_str()));
        assert_eq!(active.device_id.as_deref(), Some("laptop"));
        assert_eq!(active.label.as_deref(), Some("work"));
    }

    #[test]
    fn test_bad_proof_rejected_even_when_lenient() {
        for config in [strict(), lenient()] {
            let registry = KeyRegistry::in_memory(&config);
            let account = SigningKeyPair::generate();
            let intruder = SigningKeyPair::generate();
            let key = new_key();

            let forged = sign_ownership(&intruder, &key);
            let result = registry.register(&account.address(), &key, KeyRegistration::signed(forged));
            assert!(matches!(result, Err(Error::SignatureInvalid)));
            assert!(registry.get_active(&account.address()).unwrap().is_none());
        }
    }

    #[test]
    fn test_rotation_proof_checked() {
        let registry = KeyRegistry::in_memory(&strict());
        let account = SigningKeyPair::generate();
        let (k1, k2) = (new_key(), new_key());

        registry
            .register(&account.address(), &k1, KeyRegistration::signed(sign_ownership(&account, &k1)))
            .unwrap();

        // A proof for k1 does not authorize k2
        let result = registry.rotate(
            &account.address(),
            &k2,
            None,
            KeyRegistration::signed(sign_ownership(&account, &k1)),
        );
        assert!(matches!(result, Err(Error::SignatureInvalid)));

        registry
            .rotate(
                &account.address(),
                &k2,
                Some("routine"),
                KeyRegistration::signed(sign_ownership(&account, &k2)),
            )
            .unwrap();
        assert_eq!(
            registry.get_active(&account.address()).unwrap().unwrap().public_key,
            k2
        );
    }

    #[test]
    fn test_empty_address_rejected() {
        let registry = KeyRegistry::in_memory(&lenient());
        assert!(matches!(
            registry.register("  ", &new_key(), KeyRegistration::default()),
            Err(Error::InvalidAddress(_))
        ));
    }
}
