//! # Content Model
//!
//! What gets encrypted, how it is packaged, and where it goes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          CONTENT FLOW                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ShadowContent (plaintext JSON)                                        │
//! │        │ encrypt_content                                               │
//! │        ▼                                                                │
//! │  ContentBundle { version: 1, content, wrappedKey }                     │
//! │        │ ContentStore::put                                             │
//! │        ▼                                                                │
//! │  ContentId ──► ShadowItem { id, cid, encrypted_key, source, ... }      │
//! │                (ledger record)                                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod bundle;
mod store;

pub use bundle::{BundleV1, ContentBundle, BUNDLE_VERSION};
pub use store::{ContentId, ContentStore, MemoryContentStore};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::time::now_timestamp;

/// Maximum content identifier length in a ledger record
pub const MAX_CID_LENGTH: usize = 100;

/// Maximum wrapped key length in a ledger record
pub const MAX_KEY_LENGTH: usize = 512;

/// Maximum metadata length in a ledger record
pub const MAX_METADATA_LENGTH: usize = 256;

/// Where a piece of content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    /// Commits and repository activity
    GitHub = 0,
    /// Posts
    Twitter = 1,
}

impl ContentSource {
    /// Ledger discriminant
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ContentSource {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ContentSource::GitHub),
            1 => Ok(ContentSource::Twitter),
            other => Err(Error::InvalidSource(other)),
        }
    }
}

/// Plaintext content, serialized to JSON before encryption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowContent {
    /// Origin platform
    pub source: ContentSource,
    /// Link to the original item
    pub url: String,
    /// The content itself
    pub body: String,
    /// Unix seconds when the content was created
    pub timestamp: i64,
    /// Source-specific extra fields
    #[serde(default)]
    pub raw_meta: serde_json::Value,
}

impl ShadowContent {
    /// Content captured now, with no extra fields
    pub fn new(source: ContentSource, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            source,
            url: url.into(),
            body: body.into(),
            timestamp: now_timestamp(),
            raw_meta: serde_json::Value::Null,
        }
    }

    /// Attach source-specific fields
    pub fn with_meta(mut self, raw_meta: serde_json::Value) -> Self {
        self.raw_meta = raw_meta;
        self
    }

    /// Serialize to the bytes that get encrypted
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse decrypted bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::MalformedPayload(format!("content: {}", e)))
    }
}

/// Ledger record pointing at a stored bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowItem {
    /// `SHA-256(address || nonce || cid)`
    #[serde(with = "crate::crypto::hex_serde::array")]
    pub id: [u8; 32],
    /// Content identifier in the content store
    pub cid: String,
    /// Wrapped content key
    #[serde(with = "crate::crypto::hex_serde::vec")]
    pub encrypted_key: Vec<u8>,
    /// Unix seconds
    pub timestamp: i64,
    /// Origin platform
    pub source: ContentSource,
    /// Free-form metadata
    #[serde(with = "crate::crypto::hex_serde::vec")]
    pub metadata: Vec<u8>,
}

impl ShadowItem {
    /// Build a record, enforcing the ledger's field bounds.
    pub fn new(
        address: &str,
        nonce: u64,
        cid: impl Into<String>,
        encrypted_key: Vec<u8>,
        timestamp: i64,
        source: ContentSource,
        metadata: Vec<u8>,
    ) -> Result<Self> {
        let cid = cid.into();
        if cid.len() > MAX_CID_LENGTH {
            return Err(Error::CidTooLong(cid.len()));
        }
        Self::check_payload_bounds(&encrypted_key, &metadata)?;

        Ok(Self {
            id: Self::compute_id(address, nonce, &cid),
            cid,
            encrypted_key,
            timestamp,
            source,
            metadata,
        })
    }

    /// Check the bounds that are known before the content id is.
    pub fn check_payload_bounds(encrypted_key: &[u8], metadata: &[u8]) -> Result<()> {
        if encrypted_key.len() > MAX_KEY_LENGTH {
            return Err(Error::KeyTooLong(encrypted_key.len()));
        }
        if metadata.len() > MAX_METADATA_LENGTH {
            return Err(Error::MetadataTooLong(metadata.len()));
        }
        Ok(())
    }

    /// Item id for an account, its nonce and the content id
    pub fn compute_id(address: &str, nonce: u64, cid: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(address.as_bytes());
        hasher.update(nonce.to_le_bytes());
        hasher.update(cid.as_bytes());
        hasher.finalize().into()
    }

    /// Hex item id
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ShadowContent {
        ShadowContent {
            source: ContentSource::GitHub,
            url: "https://github.com/example/repo/commit/abc123".into(),
            body: "Fix off-by-one in parser".into(),
            timestamp: 1_700_000_000,
            raw_meta: serde_json::json!({ "sha": "abc123", "additions": 3 }),
        }
    }

    #[test]
    fn test_source_discriminants() {
        assert_eq!(ContentSource::try_from(0).unwrap(), ContentSource::GitHub);
        assert_eq!(ContentSource::try_from(1).unwrap(), ContentSource::Twitter);
        assert!(matches!(ContentSource::try_from(2), Err(Error::InvalidSource(2))));
        assert_eq!(ContentSource::Twitter.as_u8(), 1);
    }

    #[test]
    fn test_content_bytes() {
        let content = sample();
        let parsed = ShadowContent::from_bytes(&content.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, content);

        assert!(matches!(
            ShadowContent::from_bytes(b"\x00\x01 not json"),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_new_content_is_stamped_now() {
        let before = now_timestamp();
        let content = ShadowContent::new(ContentSource::GitHub, "https://github.com/x", "body")
            .with_meta(serde_json::json!({ "sha": "abc" }));

        assert!(content.timestamp >= before && content.timestamp <= now_timestamp());
        assert_eq!(content.raw_meta["sha"], "abc");
        let parsed = ShadowContent::from_bytes(&content.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, content);
    }

    #[test]
    fn test_raw_meta_optional() {
        let json = r#"{"source":"twitter","url":"u","body":"b","timestamp":1}"#;
        let content = ShadowContent::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(content.source, ContentSource::Twitter);
        assert!(content.raw_meta.is_null());
    }

    #[test]
    fn test_item_id_binds_inputs() {
        let base = ShadowItem::compute_id("alice", 0, "cid-1");
        assert_eq!(base, ShadowItem::compute_id("alice", 0, "cid-1"));
        assert_ne!(base, ShadowItem::compute_id("bob", 0, "cid-1"));
        assert_ne!(base, ShadowItem::compute_id("alice", 1, "cid-1"));
        assert_ne!(base, ShadowItem::compute_id("alice", 0, "cid-2"));
    }

    #[test]
    fn test_item_bounds() {
        let ok = ShadowItem::new("alice", 0, "c".repeat(100), vec![0; 512], 1, ContentSource::GitHub, vec![0; 256]);
        assert!(ok.is_ok());

        assert!(matches!(
            ShadowItem::new("alice", 0, "c".repeat(101), vec![], 1, ContentSource::GitHub, vec![]),
            Err(Error::CidTooLong(101))
        ));
        assert!(matches!(
            ShadowItem::new("alice", 0, "cid", vec![0; 513], 1, ContentSource::GitHub, vec![]),
            Err(Error::KeyTooLong(513))
        ));
        assert!(matches!(
            ShadowItem::new("alice", 0, "cid", vec![], 1, ContentSource::GitHub, vec![0; 257]),
            Err(Error::MetadataTooLong(257))
        ));
    }
}
