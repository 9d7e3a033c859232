//! # Stored Key Records
//!
//! Password encryption of the private key, and portable backups.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        AT-REST FORMAT                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  StoredKeyPair                                                         │
//! │  ┌──────────────────────────────────────────────────────────────┐      │
//! │  │ publicKey            32 bytes   (plaintext, for display)     │      │
//! │  │ encryptedPrivateKey  32 + 16    XChaCha20-Poly1305           │      │
//! │  │ salt                 16 bytes   fresh per record              │      │
//! │  │ nonce                24 bytes   fresh per record              │      │
//! │  │ kdf                  Argon2id cost parameters                │      │
//! │  └──────────────────────────────────────────────────────────────┘      │
//! │                                                                         │
//! │  KeyBackup (export)                                                    │
//! │  ┌──────────────────────────────────────────────────────────────┐      │
//! │  │ version, salt', nonce', kdf                                  │      │
//! │  │ ciphertext = XChaCha20-Poly1305(                             │      │
//! │  │     Argon2id(export_password, salt'), nonce',                │      │
//! │  │     json(StoredKeyPair))                                     │      │
//! │  └──────────────────────────────────────────────────────────────┘      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Wrong passwords surface as `InvalidPassword` and never return partial key
//! bytes.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{
    decrypt_symmetric, derive_key_from_password, encrypt_symmetric, hex_serde, EncryptedPayload,
    EncryptionKeyPair, KdfParams, PasswordKey, Salt, SymmetricKey, NONCE_SIZE, PUBLIC_KEY_SIZE,
    SALT_SIZE,
};
use crate::error::{Error, Result};

use super::secure_store::SecretStore;

/// Current backup format version
pub const BACKUP_VERSION: u8 = 1;

/// A password-encrypted encryption keypair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeyPair {
    /// X25519 public key
    #[serde(with = "hex_serde::array")]
    pub public_key: [u8; PUBLIC_KEY_SIZE],

    /// Private key encrypted under the password-derived key
    #[serde(with = "hex_serde::vec")]
    pub encrypted_private_key: Vec<u8>,

    /// Argon2 salt
    #[serde(with = "hex_serde::array")]
    pub salt: [u8; SALT_SIZE],

    /// XChaCha20 nonce
    #[serde(with = "hex_serde::array")]
    pub nonce: [u8; NONCE_SIZE],

    /// Cost parameters the record was sealed with
    #[serde(default)]
    pub kdf: KdfParams,
}

impl StoredKeyPair {
    /// Hex encoding of the public key
    pub fn public_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let stored: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::MalformedPayload(e.to_string()))?;
        stored.kdf.validate()?;
        Ok(stored)
    }
}

fn seal_with(key: &PasswordKey, plaintext: &[u8]) -> Result<EncryptedPayload> {
    encrypt_symmetric(&SymmetricKey::from_bytes(*key.as_bytes()), plaintext)
}

fn open_with(key: &PasswordKey, ciphertext: &[u8], nonce: [u8; NONCE_SIZE]) -> Result<Zeroizing<Vec<u8>>> {
    let payload = EncryptedPayload {
        ciphertext: ciphertext.to_vec(),
        nonce,
        ephemeral_public_key: None,
    };
    decrypt_symmetric(&SymmetricKey::from_bytes(*key.as_bytes()), &payload)
        .map(Zeroizing::new)
        .map_err(|e| match e {
            Error::DecryptionFailed => Error::InvalidPassword,
            other => other,
        })
}

// ============================================================================
// PRIVATE KEY ENCRYPTION
// ============================================================================

/// Encrypt a keypair's private half under `password`.
///
/// A fresh salt and nonce are drawn on every call.
pub fn encrypt_private_key(
    keypair: &EncryptionKeyPair,
    password: &str,
    params: &KdfParams,
) -> Result<StoredKeyPair> {
    let salt = Salt::random();
    let key = derive_key_from_password(password, &salt, params)?;

    let secret = keypair.secret_bytes();
    let sealed = seal_with(&key, secret.as_slice())?;

    Ok(StoredKeyPair {
        public_key: keypair.public_bytes(),
        encrypted_private_key: sealed.ciphertext,
        salt: *salt.as_bytes(),
        nonce: sealed.nonce,
        kdf: *params,
    })
}

/// Salt a stored record was sealed with.
///
/// Lets callers run the slow derivation elsewhere and finish with
/// [`decrypt_private_key_with`].
pub fn record_salt(stored: &StoredKeyPair) -> Salt {
    Salt::from_bytes(stored.salt)
}

/// Decrypt a stored record with `password`.
pub fn decrypt_private_key(stored: &StoredKeyPair, password: &str) -> Result<EncryptionKeyPair> {
    let key = derive_key_from_password(password, &record_salt(stored), &stored.kdf)?;
    decrypt_private_key_with(stored, &key)
}

/// Decrypt a stored record with an already-derived password key.
pub fn decrypt_private_key_with(stored: &StoredKeyPair, key: &PasswordKey) -> Result<EncryptionKeyPair> {
    let secret = open_with(key, &stored.encrypted_private_key, stored.nonce)?;

    let bytes: Zeroizing<[u8; 32]> = Zeroizing::new(secret.as_slice().try_into().map_err(|_| {
        Error::InvalidKeyLength {
            expected: 32,
            actual: secret.len(),
        }
    })?);
    let keypair = EncryptionKeyPair::from_secret_bytes(*bytes);

    if keypair.public_bytes() != stored.public_key {
        return Err(Error::MalformedPayload(
            "stored public key does not match the decrypted private key".into(),
        ));
    }

    Ok(keypair)
}

// ============================================================================
// PERSISTENCE
// ============================================================================

/// Encrypt `keypair` under `password` and write it to `store` under `name`.
pub fn store_key_pair(
    store: &dyn SecretStore,
    name: &str,
    keypair: &EncryptionKeyPair,
    password: &str,
    params: &KdfParams,
) -> Result<StoredKeyPair> {
    let stored = encrypt_private_key(keypair, password, params)?;
    write_stored(store, name, &stored)?;
    Ok(stored)
}

/// Read and decrypt the keypair stored under `name`.
pub fn load_key_pair(store: &dyn SecretStore, name: &str, password: &str) -> Result<EncryptionKeyPair> {
    let stored = read_stored(store, name)?.ok_or(Error::NoStoredKey)?;
    decrypt_private_key(&stored, password)
}

/// Read the encrypted record without decrypting it
pub fn read_stored(store: &dyn SecretStore, name: &str) -> Result<Option<StoredKeyPair>> {
    match store.retrieve(name)? {
        Some(bytes) => Ok(Some(StoredKeyPair::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Write an already-encrypted record
pub fn write_stored(store: &dyn SecretStore, name: &str, stored: &StoredKeyPair) -> Result<()> {
    store.store(name, &stored.to_bytes()?)
}

// ============================================================================
// EXPORT / IMPORT
// ============================================================================

/// Portable encrypted backup of a [`StoredKeyPair`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBackup {
    /// Backup format version
    pub version: u8,

    /// Salt for the export password
    #[serde(with = "hex_serde::array")]
    pub salt: [u8; SALT_SIZE],

    /// Nonce for the outer layer
    #[serde(with = "hex_serde::array")]
    pub nonce: [u8; NONCE_SIZE],

    /// Cost parameters for the export password
    pub kdf: KdfParams,

    /// Encrypted JSON of the inner record
    #[serde(with = "hex_serde::vec")]
    pub ciphertext: Vec<u8>,
}

impl KeyBackup {
    /// Serialize for transport
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a backup, rejecting unknown versions
    pub fn from_json(json: &str) -> Result<Self> {
        let backup: Self =
            serde_json::from_str(json).map_err(|e| Error::MalformedPayload(e.to_string()))?;
        if backup.version != BACKUP_VERSION {
            return Err(Error::MalformedPayload(format!(
                "unsupported backup version {}",
                backup.version
            )));
        }
        backup.kdf.validate()?;
        Ok(backup)
    }
}

/// Wrap a stored record in a second layer keyed by `export_password`.
pub fn export_key_pair(
    stored: &StoredKeyPair,
    export_password: &str,
    params: &KdfParams,
) -> Result<KeyBackup> {
    let salt = Salt::random();
    let key = derive_key_from_password(export_password, &salt, params)?;

    let inner = Zeroizing::new(stored.to_bytes()?);
    let sealed = seal_with(&key, &inner)?;

    Ok(KeyBackup {
        version: BACKUP_VERSION,
        salt: *salt.as_bytes(),
        nonce: sealed.nonce,
        kdf: *params,
        ciphertext: sealed.ciphertext,
    })
}

/// Remove the export layer, returning the inner record.
///
/// The inner record is still encrypted under its original password.
pub fn import_key_pair(backup: &KeyBackup, export_password: &str) -> Result<StoredKeyPair> {
    let key = derive_key_from_password(export_password, &Salt::from_bytes(backup.salt), &backup.kdf)?;
    let inner = open_with(&key, &backup.ciphertext, backup.nonce)?;
    StoredKeyPair::from_bytes(&inner)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::fast_params;
    use crate::vault::secure_store::{names, MemorySecretStore, SecretStore};

    #[test]
    fn test_password_round_trip() {
        let store = MemorySecretStore::new();
        let keypair = EncryptionKeyPair::generate();

        store_key_pair(&store, names::ENCRYPTION_KEY_PAIR, &keypair, "hunter2-hunter2", &fast_params())
            .unwrap();
        let loaded = load_key_pair(&store, names::ENCRYPTION_KEY_PAIR, "hunter2-hunter2").unwrap();

        assert_eq!(loaded.public_bytes(), keypair.public_bytes());
        assert_eq!(*loaded.secret_bytes(), *keypair.secret_bytes());
    }

    #[test]
    fn test_wrong_password_fails() {
        let store = MemorySecretStore::new();
        let keypair = EncryptionKeyPair::generate();

        store_key_pair(&store, names::ENCRYPTION_KEY_PAIR, &keypair, "right password", &fast_params())
            .unwrap();
        let result = load_key_pair(&store, names::ENCRYPTION_KEY_PAIR, "wrong password");

        assert!(matches!(result, Err(Error::InvalidPassword)));
    }

    #[test]
    fn test_missing_record() {
        let store = MemorySecretStore::new();
        let result = load_key_pair(&store, names::ENCRYPTION_KEY_PAIR, "whatever");
        assert!(matches!(result, Err(Error::NoStoredKey)));
    }

    #[test]
    fn test_fresh_salt_and_nonce_per_record() {
        let keypair = EncryptionKeyPair::generate();
        let a = encrypt_private_key(&keypair, "same password", &fast_params()).unwrap();
        let b = encrypt_private_key(&keypair, "same password", &fast_params()).unwrap();

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.encrypted_private_key, b.encrypted_private_key);
        assert_eq!(a.encrypted_private_key.len(), 32 + 16);
    }

    #[test]
    fn test_tampered_record_fails() {
        let keypair = EncryptionKeyPair::generate();
        let mut stored = encrypt_private_key(&keypair, "password!", &fast_params()).unwrap();
        stored.encrypted_private_key[0] ^= 1;

        assert!(matches!(
            decrypt_private_key(&stored, "password!"),
            Err(Error::InvalidPassword)
        ));
    }

    #[test]
    fn test_mismatched_public_key_detected() {
        let keypair = EncryptionKeyPair::generate();
        let mut stored = encrypt_private_key(&keypair, "password!", &fast_params()).unwrap();
        stored.public_key = EncryptionKeyPair::generate().public_bytes();

        assert!(matches!(
            decrypt_private_key(&stored, "password!"),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_export_import_round_trip() {
        let keypair = EncryptionKeyPair::generate();
        let stored = encrypt_private_key(&keypair, "device password", &fast_params()).unwrap();

        let backup = export_key_pair(&stored, "export password", &fast_params()).unwrap();
        assert_ne!(backup.salt, stored.salt);

        let json = backup.to_json().unwrap();
        let parsed = KeyBackup::from_json(&json).unwrap();
        let restored = import_key_pair(&parsed, "export password").unwrap();

        assert_eq!(restored, stored);
        let opened = decrypt_private_key(&restored, "device password").unwrap();
        assert_eq!(opened.public_bytes(), keypair.public_bytes());
    }

    #[test]
    fn test_import_wrong_export_password() {
        let keypair = EncryptionKeyPair::generate();
        let stored = encrypt_private_key(&keypair, "device password", &fast_params()).unwrap();
        let backup = export_key_pair(&stored, "export password", &fast_params()).unwrap();

        assert!(matches!(
            import_key_pair(&backup, "device password"),
            Err(Error::InvalidPassword)
        ));
    }

    #[test]
    fn test_backup_version_checked() {
        let keypair = EncryptionKeyPair::generate();
        let stored = encrypt_private_key(&keypair, "device password", &fast_params()).unwrap();
        let mut backup = export_key_pair(&stored, "export password", &fast_params()).unwrap();
        backup.version = 9;

        let json = backup.to_json().unwrap();
        assert!(matches!(KeyBackup::from_json(&json), Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_backup_with_excessive_kdf_cost_rejected() {
        let keypair = EncryptionKeyPair::generate();
        let stored = encrypt_private_key(&keypair, "device password", &fast_params()).unwrap();
        let mut backup = export_key_pair(&stored, "export password", &fast_params()).unwrap();
        backup.kdf.memory_kib = u32::MAX;

        let json = backup.to_json().unwrap();
        assert!(matches!(KeyBackup::from_json(&json), Err(Error::MalformedPayload(_))));
        // Constructed directly, the import itself refuses before deriving
        assert!(matches!(
            import_key_pair(&backup, "export password"),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_stored_record_with_excessive_kdf_cost_rejected() {
        let store = MemorySecretStore::new();
        let keypair = EncryptionKeyPair::generate();
        let mut stored = encrypt_private_key(&keypair, "device password", &fast_params()).unwrap();
        stored.kdf.iterations = u32::MAX;
        store.store(names::ENCRYPTION_KEY_PAIR, &serde_json::to_vec(&stored).unwrap()).unwrap();

        assert!(matches!(
            load_key_pair(&store, names::ENCRYPTION_KEY_PAIR, "device password"),
            Err(Error::MalformedPayload(_))
        ));
    }
}
