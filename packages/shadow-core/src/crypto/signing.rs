//! # Ownership Proofs
//!
//! Ed25519 signatures binding an account address to an encryption key.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        OWNERSHIP PROOF                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  CLIENT                                                                │
//! │  message = ownership_message(address, encryption_pubhex)               │
//! │  proof   = Ed25519Sign(account_signing_key, message)  → 64 bytes hex   │
//! │                                                                         │
//! │  REGISTRY                                                              │
//! │  verifying_key = hex_decode(address)                                   │
//! │  Ed25519Verify(verifying_key, message, proof)                          │
//! │     ✓ key accepted                                                     │
//! │     ✗ SignatureInvalid                                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The message is deterministic, so a proof for one key can never be replayed
//! for another key or another account.

use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::crypto::keys::hex_serde;
use crate::crypto::SigningKeyPair;
use crate::error::{Error, Result};

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Version prefix of the ownership message
pub const OWNERSHIP_MESSAGE_PREFIX: &str = "shadow-ownership-v1";

/// An Ed25519 digital signature
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "hex_serde::array")] pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 64 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; SIGNATURE_SIZE] = slice.try_into().map_err(|_| Error::InvalidKeyLength {
            expected: SIGNATURE_SIZE,
            actual: slice.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Encode as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex string.
    ///
    /// Undecodable input is reported as `SignatureInvalid`, as is anything
    /// that is not 64 bytes.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| Error::SignatureInvalid)?;
        Self::from_slice(&bytes).map_err(|_| Error::SignatureInvalid)
    }
}

/// Sign a message using Ed25519
pub fn sign(keypair: &SigningKeyPair, message: &[u8]) -> Signature {
    let sig = keypair.signing_key().sign(message);
    Signature(sig.to_bytes())
}

/// Verify an Ed25519 signature
///
/// Returns `Err(SignatureInvalid)` if the signature does not verify.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &Signature) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::InvalidAddress(format!("Invalid public key: {}", e)))?;

    let sig = Ed25519Signature::from_bytes(&signature.0);

    verifying_key
        .verify(message, &sig)
        .map_err(|_| Error::SignatureInvalid)
}

/// Build the deterministic message an account signs to endorse a key.
pub fn ownership_message(address: &str, public_key_hex: &str) -> String {
    format!(
        "{}: I authorize use of encryption key {} for account {}",
        OWNERSHIP_MESSAGE_PREFIX,
        public_key_hex.to_lowercase(),
        address
    )
}

/// Sign the ownership message for `public_key_hex` with the account key.
///
/// Returns the hex signature expected by the registry.
pub fn sign_ownership(account: &SigningKeyPair, public_key_hex: &str) -> String {
    let message = ownership_message(&account.address(), public_key_hex);
    sign(account, message.as_bytes()).to_hex()
}

// ============================================================================
// VERIFICATION STRATEGY
// ============================================================================

/// Checks an ownership proof for an address.
///
/// The registry holds one of these, chosen at construction.
pub trait OwnershipVerifier: Send + Sync {
    /// Verify `signature_hex` over `ownership_message(address, public_key_hex)`.
    fn verify(&self, address: &str, public_key_hex: &str, signature_hex: &str) -> Result<()>;
}

/// Verifies proofs for addresses that are hex-encoded Ed25519 public keys
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519OwnershipVerifier;

impl OwnershipVerifier for Ed25519OwnershipVerifier {
    fn verify(&self, address: &str, public_key_hex: &str, signature_hex: &str) -> Result<()> {
        let address_bytes = hex::decode(address)
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))?;
        let address_key: [u8; 32] = address_bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidAddress(format!("{}: expected 32 bytes", address)))?;

        let signature = Signature::from_hex(signature_hex)?;
        let message = ownership_message(address, public_key_hex);

        verify(&address_key, message.as_bytes(), &signature).map_err(|e| {
            tracing::warn!(address = %address, "Ownership proof rejected");
            e
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
