//! # Cryptography Module
//!
//! All cryptographic primitives used by Shadow Core.
//!
//! ## Security Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    KEY HIERARCHY                                │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Account Seed (256 bits)                                       │   │
//! │  │                          │                                      │   │
//! │  │            ┌─────────────┴─────────────┐                       │   │
//! │  │            ▼                           ▼                       │   │
//! │  │  ┌─────────────────┐         ┌─────────────────┐              │   │
//! │  │  │  Signing Key    │         │ Encryption Key  │              │   │
//! │  │  │  (Ed25519)      │         │ (X25519)        │              │   │
//! │  │  │                 │         │                 │              │   │
//! │  │  │ • Address       │         │ • Key unwrap    │              │   │
//! │  │  │ • Ownership     │         │ • Registered    │              │   │
//! │  │  │   proofs        │         │   public half   │              │   │
//! │  │  └─────────────────┘         └─────────────────┘              │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 ENCRYPTION SCHEME                               │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Content:  XChaCha20-Poly1305, fresh key + 192-bit nonce       │   │
//! │  │  Key wrap: X25519 (ephemeral) + XSalsa20-Poly1305 box          │   │
//! │  │  At rest:  Argon2id(password, salt) → XChaCha20-Poly1305       │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | Ed25519 | Account identity, ownership proofs |
//! | X25519 | Key wrap recipient |
//! | XChaCha20-Poly1305 | Content and at-rest encryption |
//! | XSalsa20-Poly1305 (crypto_box) | Key wrap |
//! | HKDF-SHA256 | Seed expansion |
//! | Argon2id | Password stretching |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: Secret keys and content keys are zeroized when dropped
//! 2. **Secure Random**: `rand::rngs::OsRng` for keys, salts and nonces
//! 3. **No Nonce Reuse**: Every encryption draws a fresh 24-byte nonce

mod hybrid;
mod kdf;
mod keys;
mod signing;

pub use hybrid::{
    decrypt_content, decrypt_symmetric, encrypt_content, encrypt_symmetric, unwrap_key, wrap_key,
    EncryptedPayload, SealedContent, SymmetricKey, NONCE_SIZE, SYMMETRIC_KEY_SIZE, TAG_SIZE,
};
pub use kdf::{
    derive_key_from_password, derive_key_from_password_async, derive_keys_from_seed, DerivedKeys,
    KdfParams, PasswordKey, Salt, MAX_KDF_ITERATIONS, MAX_KDF_MEMORY_KIB, MAX_KDF_PARALLELISM, SALT_SIZE,
};
pub use keys::{decode_public_key, derive, AccountKeys, EncryptionKeyPair, SigningKeyPair, SEED_SIZE};
pub use signing::{
    ownership_message, sign, sign_ownership, verify, Ed25519OwnershipVerifier, OwnershipVerifier,
    Signature, SIGNATURE_SIZE,
};

pub(crate) use keys::hex_serde;

#[cfg(test)]
pub(crate) use kdf::tests::fast_params;

/// Size of public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
