//! # Shadow Core
//!
//! End-to-end encryption of captured content, with the key lifecycle that
//! backs it: local password-protected keys, a public key registry, and a
//! pipeline that decrypts stored content for the key holder.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SHADOW CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │  Lifecycle  │  │  Pipeline   │  │   Content   │  │   Registry   │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Generate  │  │ - Publish   │  │ - Plaintext │  │ - Register   │   │
//! │  │ - Rotate    │  │ - Open      │  │ - Bundles   │  │ - Rotate     │   │
//! │  │ - Revoke    │  │ - Batches   │  │ - Ledger    │  │ - History    │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴────────────────┴────────────────┘           │
//! │                                   │                                     │
//! │  ┌─────────────────────────────┐  │  ┌──────────────────────────────┐   │
//! │  │           Crypto            │  │  │            Vault             │   │
//! │  │                             │◄─┴─►│                              │   │
//! │  │ - X25519 key wrap (box)     │     │ - Argon2id password keys     │   │
//! │  │ - XChaCha20-Poly1305        │     │ - Encrypted keypair record   │   │
//! │  │ - Ed25519 ownership proofs  │     │ - Lock / unlock / backup     │   │
//! │  └─────────────────────────────┘     └──────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Keys, hybrid encryption, password derivation, signatures
//! - [`vault`] - Password-protected storage of this device's keypair
//! - [`registry`] - Public key registry with rotation history
//! - [`content`] - Plaintext content, ciphertext bundles, content store
//! - [`pipeline`] - Publish and decrypt stored content, abortable batches
//! - [`lifecycle`] - Client state machine over the vault and registry
//! - [`config`] - Runtime configuration
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Layer 1: Content Encryption (XChaCha20-Poly1305)                      │
//! │  ────────────────────────────────────────────────                       │
//! │  Every item gets a fresh random 256-bit key and 192-bit nonce.         │
//! │                                                                         │
//! │  Layer 2: Key Wrapping (X25519 + XSalsa20-Poly1305)                    │
//! │  ─────────────────────────────────────────────────                      │
//! │  The content key is sealed to the recipient's public key under an      │
//! │  ephemeral X25519 key that is discarded after use.                     │
//! │                                                                         │
//! │  Layer 3: Key Ownership (Ed25519)                                      │
//! │  ───────────────────────────────                                        │
//! │  Registered keys carry a signature by the account key.                 │
//! │                                                                         │
//! │  Layer 4: Local Key Storage (Argon2id + XChaCha20-Poly1305)            │
//! │  ──────────────────────────────────────────────────────                 │
//! │  The private key only touches disk encrypted under a password key.     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod content;
pub mod crypto;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod registry;
pub mod time;
pub mod vault;

pub use config::{RegistryConfig, ShadowConfig};
pub use content::{ContentBundle, ContentId, ContentSource, ContentStore, ShadowContent, ShadowItem};
pub use crypto::{decrypt_content, encrypt_content, EncryptedPayload, EncryptionKeyPair, SigningKeyPair};
pub use error::{Error, Result};
pub use lifecycle::{KeyLifecycle, KeyState, RegistryClient};
pub use pipeline::{DecryptBatch, DecryptionPipeline, ItemOutcome};
pub use registry::{KeyAction, KeyHistoryEntry, KeyRegistry, UserEncryptionKey};
pub use vault::{LocalKeyVault, VaultState};

/// Returns the version of Shadow Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        target: std::env::consts::OS,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target operating system
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert_eq!(info.version, version());
        assert!(!info.target.is_empty());
    }
}
