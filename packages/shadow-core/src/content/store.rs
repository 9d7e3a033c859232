//! Content-addressed storage collaborator.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Opaque handle returned by a [`ContentStore`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    /// Borrow the identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// External content-addressed store.
///
/// Implementations report outages as `StorageUnavailable`; retry policy is
/// the caller's.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their identifier
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentId>;

    /// Fetch the bytes for `id`
    async fn get(&self, id: &ContentId) -> Result<Vec<u8>>;
}

/// In-memory store keyed by the SHA-256 of the stored bytes
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<ContentId, Vec<u8>>>,
}

impl MemoryContentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier the store assigns to `bytes`
    pub fn id_for(bytes: &[u8]) -> ContentId {
        ContentId(hex::encode(Sha256::digest(bytes)))
    }

    /// Replace stored bytes in place. Used to simulate tampering.
    pub fn overwrite(&self, id: &ContentId, bytes: Vec<u8>) {
        self.blobs.write().insert(id.clone(), bytes);
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentId> {
        let id = Self::id_for(&bytes);
        self.blobs.write().insert(id.clone(), bytes);
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ContentNotFound(id.to_string()))
    }
}
