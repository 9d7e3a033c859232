//! # Hybrid Cipher
//!
//! Content is encrypted with a fresh symmetric key; that key is then wrapped
//! to the recipient's X25519 public key.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      CONTENT ENCRYPTION FLOW                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. Fresh content key K (32 random bytes)                              │
//! │                                                                         │
//! │  2. Content payload                                                    │
//! │     XChaCha20-Poly1305(K, nonce_c, plaintext)                          │
//! │     → { ciphertext, nonce_c }                                          │
//! │                                                                         │
//! │  3. Wrapped key payload                                                │
//! │     ephemeral keypair (e, E)                                           │
//! │     XSalsa20-Poly1305(X25519(e, recipient_pk), nonce_w, K)             │
//! │     → { ciphertext, nonce_w, ephemeralPublicKey: E }                   │
//! │                                                                         │
//! │  4. K is zeroized                                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Confidentiality | Only the holder of the recipient secret can unwrap K |
//! | Integrity | Any flipped bit in ciphertext, nonce or ephemeral key fails closed |
//! | Forward secrecy (wrap) | A fresh ephemeral keypair per encryption |
//!
//! Both nonces are 24 bytes, which is large enough for random generation
//! without a practical collision risk.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use crypto_box::SalsaBox;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::keys::hex_serde;
use crate::crypto::EncryptionKeyPair;
use crate::error::{Error, Result};

/// Size of both the content and the key-wrap nonce (192 bits)
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a symmetric content key (256 bits)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// One encrypted blob.
///
/// A present `ephemeral_public_key` marks a key-wrap payload; its absence
/// marks a content payload.
///
/// ## Wire Format
///
/// ```text
/// { "ciphertext": hex, "nonce": hex, "ephemeralPublicKey"?: hex }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    /// Ciphertext including the 16-byte authentication tag
    #[serde(with = "hex_serde::vec")]
    pub ciphertext: Vec<u8>,

    /// 24-byte nonce
    #[serde(with = "hex_serde::array")]
    pub nonce: [u8; NONCE_SIZE],

    /// Sender-side ephemeral X25519 public key (key-wrap payloads only)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "hex_serde::option_array"
    )]
    pub ephemeral_public_key: Option<[u8; 32]>,
}

impl EncryptedPayload {
    /// Whether this is a key-wrap payload
    pub fn is_wrapped_key(&self) -> bool {
        self.ephemeral_public_key.is_some()
    }

    /// Serialize to the JSON wire format
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the JSON wire format
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::MalformedPayload(e.to_string()))
    }
}

/// A 256-bit content key. Zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_SIZE]);

impl SymmetricKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; SYMMETRIC_KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let key = Self(bytes);
        bytes.zeroize();
        key
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SymmetricKey").field(&"[REDACTED]").finish()
    }
}

/// Output of [`encrypt_content`]
#[derive(Debug)]
pub struct SealedContent {
    /// The encrypted content
    pub content: EncryptedPayload,
    /// The content key wrapped to the recipient
    pub wrapped_key: EncryptedPayload,
    /// The content key itself; zeroized when this value is dropped
    pub key: SymmetricKey,
}

impl SealedContent {
    /// Wrap the same content key for another recipient.
    pub fn rewrap_for(&self, recipient_public_key: &[u8; 32]) -> Result<EncryptedPayload> {
        wrap_key(&self.key, recipient_public_key)
    }
}

fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// ============================================================================
// SYMMETRIC LAYER
// ============================================================================

/// Authenticate-encrypt `plaintext` under `key` with a fresh nonce.
pub fn encrypt_symmetric(key: &SymmetricKey, plaintext: &[u8]) -> Result<EncryptedPayload> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    let nonce = random_nonce();
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| Error::EncryptionFailed(format!("Content encryption failed: {}", e)))?;

    Ok(EncryptedPayload {
        ciphertext,
        nonce,
        ephemeral_public_key: None,
    })
}

/// Open a content payload.
///
/// ## Errors
///
/// - `MalformedPayload` if the payload carries an ephemeral key
/// - `DecryptionFailed` on any authentication failure
pub fn decrypt_symmetric(key: &SymmetricKey, payload: &EncryptedPayload) -> Result<Vec<u8>> {
    if payload.is_wrapped_key() {
        return Err(Error::MalformedPayload(
            "content payload must not carry an ephemeral key".into(),
        ));
    }

    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| Error::DecryptionFailed)?;

    cipher
        .decrypt(XNonce::from_slice(&payload.nonce), payload.ciphertext.as_slice())
        .map_err(|_| Error::DecryptionFailed)
}

// ============================================================================
// KEY WRAP LAYER
// ============================================================================

/// Wrap a content key to a recipient using a fresh ephemeral keypair.
pub fn wrap_key(key: &SymmetricKey, recipient_public_key: &[u8; 32]) -> Result<EncryptedPayload> {
    let ephemeral = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);

    let ephemeral_secret = crypto_box::SecretKey::from(ephemeral.to_bytes());
    let recipient = crypto_box::PublicKey::from(*recipient_public_key);
    let salsa_box = SalsaBox::new(&recipient, &ephemeral_secret);

    let nonce = random_nonce();
    let ciphertext = salsa_box
        .encrypt(crypto_box::Nonce::from_slice(&nonce), key.as_bytes().as_slice())
        .map_err(|e| Error::EncryptionFailed(format!("Key wrap failed: {}", e)))?;

    Ok(EncryptedPayload {
        ciphertext,
        nonce,
        ephemeral_public_key: Some(ephemeral_public.to_bytes()),
    })
}

/// Whether `point` encodes a field element below `2^255 - 19` with the top
/// bit clear. X25519 decoding accepts other encodings of the same point.
fn is_canonical_point(point: &[u8; 32]) -> bool {
    if point[31] & 0x80 != 0 {
        return false;
    }
    let at_or_above_p = point[31] == 0x7f && point[1..31].iter().all(|&b| b == 0xff) && point[0] >= 0xed;
    !at_or_above_p
}

/// Recover a content key from a wrapped-key payload.
///
/// ## Errors
///
/// - `MalformedPayload` if the payload has no ephemeral key
/// - `DecryptionFailed` if the recipient key is wrong or the payload was
///   modified
pub fn unwrap_key(payload: &EncryptedPayload, recipient: &EncryptionKeyPair) -> Result<SymmetricKey> {
    let ephemeral_public = payload.ephemeral_public_key.ok_or_else(|| {
        Error::MalformedPayload("wrapped key payload is missing the ephemeral key".into())
    })?;
    if !is_canonical_point(&ephemeral_public) {
        return Err(Error::DecryptionFailed);
    }

    let recipient_secret = crypto_box::SecretKey::from(*recipient.secret_bytes());
    let salsa_box = SalsaBox::new(&crypto_box::PublicKey::from(ephemeral_public), &recipient_secret);

    let mut opened = salsa_box
        .decrypt(
            crypto_box::Nonce::from_slice(&payload.nonce),
            payload.ciphertext.as_slice(),
        )
        .map_err(|_| Error::DecryptionFailed)?;

    let result = if opened.len() == SYMMETRIC_KEY_SIZE {
        let mut bytes = [0u8; SYMMETRIC_KEY_SIZE];
        bytes.copy_from_slice(&opened);
        let key = SymmetricKey::from_bytes(bytes);
        bytes.zeroize();
        Ok(key)
    } else {
        Err(Error::InvalidKeyLength {
            expected: SYMMETRIC_KEY_SIZE,
            actual: opened.len(),
        })
    };

    opened.zeroize();
    result
}

// ============================================================================
// HYBRID OPERATIONS
// ============================================================================

/// Encrypt `plaintext` for `recipient_public_key`.
///
/// Returns the content payload, the wrapped key payload and the content key.
pub fn encrypt_content(plaintext: &[u8], recipient_public_key: &[u8; 32]) -> Result<SealedContent> {
    let key = SymmetricKey::generate();
    let content = encrypt_symmetric(&key, plaintext)?;
    let wrapped_key = wrap_key(&key, recipient_public_key)?;

    tracing::debug!(
        plaintext_len = plaintext.len(),
        ciphertext_len = content.ciphertext.len(),
        "Content sealed"
    );

    Ok(SealedContent {
        content,
        wrapped_key,
        key,
    })
}

/// Decrypt content produced by [`encrypt_content`].
///
/// The recovered content key is zeroized before returning. No partial
/// plaintext is ever returned.
pub fn decrypt_content(
    content: &EncryptedPayload,
    wrapped_key: &EncryptedPayload,
    recipient: &EncryptionKeyPair,
) -> Result<Vec<u8>> {
    if content.is_wrapped_key() {
        return Err(Error::MalformedPayload(
            "content payload must not carry an ephemeral key".into(),
        ));
    }

    let key = unwrap_key(wrapped_key, recipient)?;
    decrypt_symmetric(&key, content)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PUBLIC_KEY_SIZE;

    fn flip_bit(bytes: &mut [u8], bit: usize) {
        bytes[bit / 8] ^= 1 << (bit % 8);
    }

    #[test]
    fn test_hello_world_scenario() {
        let recipient = EncryptionKeyPair::generate();
        let sealed = encrypt_content(b"hello world", &recipient.public_bytes()).unwrap();

        assert_eq!(sealed.content.ciphertext.len(), 11 + TAG_SIZE);
        assert_eq!(sealed.content.nonce.len(), 24);
        assert!(sealed.content.ephemeral_public_key.is_none());
        assert!(sealed.wrapped_key.ephemeral_public_key.is_some());

        let plaintext = decrypt_content(&sealed.content, &sealed.wrapped_key, &recipient).unwrap();
        assert_eq!(plaintext, b"hello world");
    }

    #[test]
    fn test_round_trip_various_sizes() {
        let recipient = EncryptionKeyPair::generate();
        for size in [0usize, 1, 15, 16, 17, 1024, 64 * 1024] {
            let plaintext: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let sealed = encrypt_content(&plaintext, &recipient.public_bytes()).unwrap();
            let opened = decrypt_content(&sealed.content, &sealed.wrapped_key, &recipient).unwrap();
            assert_eq!(opened, plaintext, "size {}", size);
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        let recipient = EncryptionKeyPair::generate();
        let sealed = encrypt_content(b"secret", &recipient.public_bytes()).unwrap();

        for _ in 0..8 {
            let other = EncryptionKeyPair::generate();
            let result = decrypt_content(&sealed.content, &sealed.wrapped_key, &other);
            assert!(matches!(result, Err(Error::DecryptionFailed)));
        }
    }

    #[test]
    fn test_every_bit_flip_detected() {
        let recipient = EncryptionKeyPair::generate();
        let sealed = encrypt_content(b"tamper me", &recipient.public_bytes()).unwrap();

        // Content ciphertext
        for bit in 0..sealed.content.ciphertext.len() * 8 {
            let mut content = sealed.content.clone();
            flip_bit(&mut content.ciphertext, bit);
            let result = decrypt_content(&content, &sealed.wrapped_key, &recipient);
            assert!(matches!(result, Err(Error::DecryptionFailed)), "content ct bit {}", bit);
        }

        // Content nonce
        for bit in 0..NONCE_SIZE * 8 {
            let mut content = sealed.content.clone();
            flip_bit(&mut content.nonce, bit);
            let result = decrypt_content(&content, &sealed.wrapped_key, &recipient);
            assert!(matches!(result, Err(Error::DecryptionFailed)), "content nonce bit {}", bit);
        }

        // Wrapped key ciphertext
        for bit in 0..sealed.wrapped_key.ciphertext.len() * 8 {
            let mut wrapped = sealed.wrapped_key.clone();
            flip_bit(&mut wrapped.ciphertext, bit);
            let result = decrypt_content(&sealed.content, &wrapped, &recipient);
            assert!(matches!(result, Err(Error::DecryptionFailed)), "wrap ct bit {}", bit);
        }

        // Wrapped key nonce
        for bit in 0..NONCE_SIZE * 8 {
            let mut wrapped = sealed.wrapped_key.clone();
            flip_bit(&mut wrapped.nonce, bit);
            let result = decrypt_content(&sealed.content, &wrapped, &recipient);
            assert!(matches!(result, Err(Error::DecryptionFailed)), "wrap nonce bit {}", bit);
        }

        // Ephemeral public key, all 256 bits
        for bit in 0..PUBLIC_KEY_SIZE * 8 {
            let mut wrapped = sealed.wrapped_key.clone();
            let mut epk = wrapped.ephemeral_public_key.unwrap();
            flip_bit(&mut epk, bit);
            wrapped.ephemeral_public_key = Some(epk);
            let result = decrypt_content(&sealed.content, &wrapped, &recipient);
            assert!(matches!(result, Err(Error::DecryptionFailed)), "epk bit {}", bit);
        }
    }

    #[test]
    fn test_non_canonical_ephemeral_key_rejected() {
        let recipient = EncryptionKeyPair::generate();
        let sealed = encrypt_content(b"hello world", &recipient.public_bytes()).unwrap();

        let mut wrapped = sealed.wrapped_key.clone();
        let mut epk = wrapped.ephemeral_public_key.unwrap();
        epk[31] ^= 0x80;
        wrapped.ephemeral_public_key = Some(epk);
        assert!(matches!(
            decrypt_content(&sealed.content, &wrapped, &recipient),
            Err(Error::DecryptionFailed)
        ));

        // p itself and p + 1 decode to 0 and 1
        let mut p = [0xffu8; 32];
        p[0] = 0xed;
        p[31] = 0x7f;
        assert!(!is_canonical_point(&p));
        p[0] = 0xee;
        assert!(!is_canonical_point(&p));
        p[0] = 0xec;
        assert!(is_canonical_point(&p));
        assert!(is_canonical_point(&recipient.public_bytes()));
    }

    #[test]
    fn test_fresh_ephemeral_key_and_nonces_per_encryption() {
        let recipient = EncryptionKeyPair::generate();
        let a = encrypt_content(b"same", &recipient.public_bytes()).unwrap();
        let b = encrypt_content(b"same", &recipient.public_bytes()).unwrap();

        assert_ne!(a.wrapped_key.ephemeral_public_key, b.wrapped_key.ephemeral_public_key);
        assert_ne!(a.content.nonce, b.content.nonce);
        assert_ne!(a.content.ciphertext, b.content.ciphertext);
        assert_ne!(a.key.as_bytes(), b.key.as_bytes());
    }

    #[test]
    fn test_swapped_payload_roles_are_malformed() {
        let recipient = EncryptionKeyPair::generate();
        let sealed = encrypt_content(b"roles", &recipient.public_bytes()).unwrap();

        let result = decrypt_content(&sealed.wrapped_key, &sealed.content, &recipient);
        assert!(matches!(result, Err(Error::MalformedPayload(_))));

        let result = unwrap_key(&sealed.content, &recipient);
        assert!(matches!(result, Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_rewrap_for_second_recipient() {
        let first = EncryptionKeyPair::generate();
        let second = EncryptionKeyPair::generate();

        let sealed = encrypt_content(b"shared", &first.public_bytes()).unwrap();
        let wrapped_second = sealed.rewrap_for(&second.public_bytes()).unwrap();

        let opened = decrypt_content(&sealed.content, &wrapped_second, &second).unwrap();
        assert_eq!(opened, b"shared");
        // The original wrap is still for the first recipient only
        assert!(decrypt_content(&sealed.content, &sealed.wrapped_key, &second).is_err());
    }

    #[test]
    fn test_symmetric_layer_round_trip() {
        let key = SymmetricKey::generate();
        let payload = encrypt_symmetric(&key, b"layer").unwrap();
        assert_eq!(decrypt_symmetric(&key, &payload).unwrap(), b"layer");

        let other = SymmetricKey::generate();
        assert!(matches!(decrypt_symmetric(&other, &payload), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_wire_format() {
        let recipient = EncryptionKeyPair::generate();
        let sealed = encrypt_content(b"wire", &recipient.public_bytes()).unwrap();

        let content_json: serde_json::Value =
            serde_json::from_str(&sealed.content.to_json().unwrap()).unwrap();
        assert!(content_json.get("ephemeralPublicKey").is_none());
        assert_eq!(content_json["nonce"].as_str().unwrap().len(), NONCE_SIZE * 2);

        let wrapped_json = sealed.wrapped_key.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&wrapped_json).unwrap();
        assert_eq!(value["ephemeralPublicKey"].as_str().unwrap().len(), 64);

        let parsed = EncryptedPayload::from_json(&wrapped_json).unwrap();
        assert_eq!(parsed, sealed.wrapped_key);
    }

    #[test]
    fn test_wire_format_rejects_bad_lengths() {
        let bad_nonce = r#"{"ciphertext":"00","nonce":"0011"}"#;
        assert!(matches!(
            EncryptedPayload::from_json(bad_nonce),
            Err(Error::MalformedPayload(_))
        ));

        let bad_epk = format!(
            r#"{{"ciphertext":"00","nonce":"{}","ephemeralPublicKey":"abcd"}}"#,
            "00".repeat(NONCE_SIZE)
        );
        assert!(matches!(
            EncryptedPayload::from_json(&bad_epk),
            Err(Error::MalformedPayload(_))
        ));
    }
}
