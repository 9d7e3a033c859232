//! # Decryption Pipeline
//!
//! Publishes content as encrypted bundles and turns stored bundles back into
//! plaintext.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         OPEN ONE ITEM                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ContentId                                                             │
//! │     │ ContentStore::get        ──► StorageUnavailable / ContentNotFound │
//! │     ▼                                                                   │
//! │  bytes                                                                 │
//! │     │ ContentBundle::from_bytes ──► MalformedPayload                   │
//! │     ▼                                                                   │
//! │  (content, wrappedKey)                                                 │
//! │     │ vault keypair             ──► KeyNotLoaded                       │
//! │     │ decrypt_content           ──► DecryptionFailed                   │
//! │     ▼                                                                   │
//! │  plaintext                                                             │
//! │     │ ShadowContent::from_bytes ──► MalformedPayload                   │
//! │     ▼                                                                   │
//! │  ShadowContent                                                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A batch opens every item independently. One item failing or being
//! aborted never affects its siblings.

use futures::future::{join_all, AbortHandle, Abortable, Aborted, BoxFuture};
use futures::FutureExt;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::content::{ContentBundle, ContentId, ContentStore, ShadowContent, ShadowItem};
use crate::crypto::{decrypt_content, encrypt_content, SealedContent};
use crate::error::{Error, Result};
use crate::vault::LocalKeyVault;

/// Encrypts, stores, fetches and decrypts content
#[derive(Clone)]
pub struct DecryptionPipeline {
    store: Arc<dyn ContentStore>,
    vault: Arc<LocalKeyVault>,
}

impl DecryptionPipeline {
    /// Build a pipeline over a content store and the local vault
    pub fn new(store: Arc<dyn ContentStore>, vault: Arc<LocalKeyVault>) -> Self {
        Self { store, vault }
    }

    fn seal(content: &ShadowContent, recipient_public_key: &[u8; 32]) -> Result<SealedContent> {
        let plaintext = Zeroizing::new(content.to_bytes()?);
        encrypt_content(&plaintext, recipient_public_key)
    }

    async fn store_bundle(&self, sealed: &SealedContent) -> Result<ContentId> {
        let id = self.store.put(ContentBundle::seal(sealed).to_bytes()?).await?;
        tracing::debug!(content_id = %id, "Bundle stored");
        Ok(id)
    }

    /// Encrypt `content` for `recipient_public_key` and store the bundle.
    pub async fn publish(&self, content: &ShadowContent, recipient_public_key: &[u8; 32]) -> Result<ContentId> {
        let sealed = Self::seal(content, recipient_public_key)?;
        self.store_bundle(&sealed).await
    }

    /// Publish and build the ledger record for the stored bundle.
    ///
    /// `nonce` is the account's ledger nonce; it makes the item id unique.
    pub async fn publish_item(
        &self,
        address: &str,
        nonce: u64,
        content: &ShadowContent,
        recipient_public_key: &[u8; 32],
        metadata: Vec<u8>,
    ) -> Result<ShadowItem> {
        let sealed = Self::seal(content, recipient_public_key)?;
        let encrypted_key = sealed.wrapped_key.to_json()?.into_bytes();
        // Nothing is stored for a record the ledger would refuse
        ShadowItem::check_payload_bounds(&encrypted_key, &metadata)?;

        let id = self.store_bundle(&sealed).await?;

        ShadowItem::new(
            address,
            nonce,
            id.0,
            encrypted_key,
            content.timestamp,
            content.source,
            metadata,
        )
    }

    /// Fetch and decrypt one item.
    pub async fn open(&self, id: &ContentId) -> Result<ShadowContent> {
        let bytes = self.store.get(id).await?;
        let bundle = ContentBundle::from_bytes(&bytes)?;
        let (content, wrapped_key) = bundle.payloads();

        let plaintext = self
            .vault
            .with_keypair(|keypair| decrypt_content(content, wrapped_key, keypair))?
            .map(Zeroizing::new)
            .map_err(|e| {
                if matches!(e, Error::DecryptionFailed) {
                    tracing::warn!(content_id = %id, "Bundle failed authentication");
                }
                e
            })?;

        let opened = ShadowContent::from_bytes(&plaintext)?;
        tracing::debug!(content_id = %id, "Bundle opened");
        Ok(opened)
    }

    /// Prepare a batch that opens every id independently.
    ///
    /// Nothing runs until [`DecryptBatch::run`] is awaited; items can be
    /// aborted before or during the run.
    pub fn batch(&self, ids: Vec<ContentId>) -> DecryptBatch {
        let mut handles = Vec::with_capacity(ids.len());
        let mut tasks = Vec::with_capacity(ids.len());

        for id in &ids {
            let (handle, registration) = AbortHandle::new_pair();
            let pipeline = self.clone();
            let id = id.clone();
            let task = async move { pipeline.open(&id).await }.boxed();

            handles.push(handle);
            tasks.push(Abortable::new(task, registration));
        }

        DecryptBatch { ids, handles, tasks }
    }
}

/// Result for one batch item
#[derive(Debug)]
pub enum ItemOutcome {
    /// Decrypted successfully
    Decrypted(ShadowContent),
    /// The vault was locked; show a placeholder and prompt for the password
    Locked,
    /// Fetch, parse or decryption failed
    Failed(Error),
    /// Aborted through its handle
    Aborted,
}

impl ItemOutcome {
    fn from_result(result: std::result::Result<Result<ShadowContent>, Aborted>) -> Self {
        match result {
            Ok(Ok(content)) => ItemOutcome::Decrypted(content),
            Ok(Err(Error::KeyNotLoaded)) => ItemOutcome::Locked,
            Ok(Err(e)) => ItemOutcome::Failed(e),
            Err(Aborted) => ItemOutcome::Aborted,
        }
    }

    /// The decrypted content, if any
    pub fn content(&self) -> Option<&ShadowContent> {
        match self {
            ItemOutcome::Decrypted(content) => Some(content),
            _ => None,
        }
    }
}

/// One batch entry after running
#[derive(Debug)]
pub struct BatchItem {
    /// Which item
    pub id: ContentId,
    /// What happened to it
    pub outcome: ItemOutcome,
}

/// A set of independent decryptions with per-item abort
pub struct DecryptBatch {
    ids: Vec<ContentId>,
    handles: Vec<AbortHandle>,
    tasks: Vec<Abortable<BoxFuture<'static, Result<ShadowContent>>>>,
}

impl DecryptBatch {
    /// Number of items
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the batch has no items
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Handle that aborts item `index`, usable from another task
    pub fn abort_handle(&self, index: usize) -> Option<AbortHandle> {
        self.handles.get(index).cloned()
    }

    /// Abort item `index`. Returns false if there is no such item.
    pub fn abort(&self, index: usize) -> bool {
        match self.handles.get(index) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every item
    pub fn abort_all(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }

    /// Run all items concurrently; results are in input order.
    pub async fn run(self) -> Vec<BatchItem> {
        let results = join_all(self.tasks).await;

        self.ids
            .into_iter()
            .zip(results)
            .map(|(id, result)| BatchItem {
                id,
                outcome: ItemOutcome::from_result(result),
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
