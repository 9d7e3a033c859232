//! # Key Types
//!
//! Keypairs used by Shadow Core.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           KEY TYPES                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  AccountKeys                                                           │
//! │  ├── signing: SigningKeyPair (Ed25519)                                 │
//! │  │     - Identifies the account (address = hex public key)             │
//! │  │     - Signs ownership proofs for encryption keys                    │
//! │  │                                                                      │
//! │  └── encryption: EncryptionKeyPair (X25519)                            │
//! │        - Recipient key for wrapped content keys                        │
//! │        - Public half is registered with the key registry               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Secret halves are zeroized on drop and never serialized in the clear.

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::crypto::kdf::{derive_encryption_scalar, derive_keys_from_seed};
use crate::crypto::PUBLIC_KEY_SIZE;
use crate::error::{Error, Result};

/// Size of an account seed in bytes
pub const SEED_SIZE: usize = 32;

/// Derive the encryption keypair for a signing-key seed.
///
/// Pure and deterministic: the scalar is expanded from the seed with HKDF
/// and the public key is the X25519 base-point multiple of that scalar.
///
/// ## Errors
///
/// `InvalidSeedLength` if `seed` is not exactly 32 bytes.
pub fn derive(seed: &[u8]) -> Result<EncryptionKeyPair> {
    let seed: &[u8; SEED_SIZE] = seed
        .try_into()
        .map_err(|_| Error::InvalidSeedLength(seed.len()))?;

    let scalar = zeroize::Zeroizing::new(derive_encryption_scalar(seed)?);
    Ok(EncryptionKeyPair::from_secret_bytes(*scalar))
}

/// Account signing key plus the encryption key derived from the same seed
#[derive(ZeroizeOnDrop)]
pub struct AccountKeys {
    /// Ed25519 keypair identifying the account
    pub signing: SigningKeyPair,
    /// X25519 keypair for content encryption
    pub encryption: EncryptionKeyPair,
}

impl AccountKeys {
    /// Generate random account keys
    pub fn generate() -> Self {
        Self {
            signing: SigningKeyPair::generate(),
            encryption: EncryptionKeyPair::generate(),
        }
    }

    /// Derive both keypairs from a 32-byte seed.
    ///
    /// ```text
    /// Seed (32 bytes)
    ///       │
    ///       ├──► HKDF(seed, "shadow-signing-key-v1")    → Signing Key
    ///       │
    ///       └──► HKDF(seed, "shadow-encryption-key-v1") → Encryption Key
    /// ```
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let seed: &[u8; SEED_SIZE] = seed
            .try_into()
            .map_err(|_| Error::InvalidSeedLength(seed.len()))?;

        let derived = derive_keys_from_seed(seed)?;

        Ok(Self {
            signing: SigningKeyPair::from_bytes(&derived.signing_key),
            encryption: EncryptionKeyPair::from_secret_bytes(derived.encryption_key),
        })
    }

    /// The account address (hex-encoded Ed25519 public key)
    pub fn address(&self) -> String {
        self.signing.address()
    }
}

/// Ed25519 signing keypair
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        Self {
            secret: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create from raw secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(bytes),
        }
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    /// Get the verifying key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.secret.verifying_key()
    }

    /// Account address for this key
    pub fn address(&self) -> String {
        hex::encode(self.public_bytes())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

/// X25519 encryption keypair.
///
/// Always produced together; the public key is recomputed from the secret
/// so the halves can never disagree.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKeyPair {
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    #[zeroize(skip)]
    public: X25519PublicKey,
}

impl EncryptionKeyPair {
    /// Generate a new random encryption keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a keypair from its 32-byte secret scalar
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the secret key bytes.
    ///
    /// Only for encrypting the key at rest. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> zeroize::Zeroizing<[u8; 32]> {
        zeroize::Zeroizing::new(self.secret.to_bytes())
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Hex encoding of the public key, as used on the wire
    pub fn public_hex(&self) -> String {
        hex::encode(self.public.as_bytes())
    }
}

impl std::fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeyPair")
            .field("public", &self.public_hex())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Decode a hex public key, strictly requiring 32 bytes.
pub fn decode_public_key(hex_str: &str) -> Result<[u8; PUBLIC_KEY_SIZE]> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| Error::MalformedPayload(format!("Invalid public key hex: {}", e)))?;

    bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidKeyLength {
            expected: PUBLIC_KEY_SIZE,
            actual: bytes.len(),
        })
}

/// Serde helpers for hex-encoded byte fields on the wire
pub(crate) mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Fixed-size arrays
    pub mod array {
        use super::*;

        pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&hex::encode(bytes))
        }

        pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
            let len = bytes.len();
            bytes
                .try_into()
                .map_err(|_| serde::de::Error::custom(format!("expected {} bytes, got {}", N, len)))
        }
    }

    /// Optional fixed-size arrays
    pub mod option_array {
        use super::*;

        pub fn serialize<S, const N: usize>(
            bytes: &Option<[u8; N]>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match bytes {
                Some(b) => serializer.serialize_some(&hex::encode(b)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D, const N: usize>(
            deserializer: D,
        ) -> Result<Option<[u8; N]>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s: Option<String> = Option::deserialize(deserializer)?;
            match s {
                None => Ok(None),
                Some(s) => {
                    let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
                    let len = bytes.len();
                    bytes.try_into().map(Some).map_err(|_| {
                        serde::de::Error::custom(format!("expected {} bytes, got {}", N, len))
                    })
                }
            }
        }
    }

    /// Variable-length byte vectors
    pub mod vec {
        use super::*;

        pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&hex::encode(bytes))
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            hex::decode(&s).map_err(serde::de::Error::custom)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
