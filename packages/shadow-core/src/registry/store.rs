//! Registry persistence strategy and the in-memory backend.

use parking_lot::Mutex;

use super::types::{KeyHistoryEntry, KeyTransition, UserEncryptionKey};
use crate::error::{Error, Result};

/// Persistence behind [`KeyRegistry`](super::KeyRegistry).
///
/// `commit` must apply the whole transition or nothing.
pub trait KeyStore: Send + Sync {
    /// The active key for `address`, if any
    fn active(&self, address: &str) -> Result<Option<UserEncryptionKey>>;

    /// Every key ever registered for `address`, newest first
    fn keys(&self, address: &str) -> Result<Vec<UserEncryptionKey>>;

    /// Audit trail for `address`, oldest first
    fn history(&self, address: &str) -> Result<Vec<KeyHistoryEntry>>;

    /// Atomically deactivate, insert and append history
    fn commit(&self, transition: &KeyTransition) -> Result<()>;
}

#[derive(Default)]
struct MemoryState {
    keys: Vec<UserEncryptionKey>,
    history: Vec<KeyHistoryEntry>,
}

/// Key store held entirely in memory
#[derive(Default)]
pub struct MemoryKeyStore {
    state: Mutex<MemoryState>,
}

impl MemoryKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn active(&self, address: &str) -> Result<Option<UserEncryptionKey>> {
        let state = self.state.lock();
        Ok(state
            .keys
            .iter()
            .find(|k| k.address == address && k.is_active)
            .cloned())
    }

    fn keys(&self, address: &str) -> Result<Vec<UserEncryptionKey>> {
        let state = self.state.lock();
        Ok(state
            .keys
            .iter()
            .rev()
            .filter(|k| k.address == address)
            .cloned()
            .collect())
    }

    fn history(&self, address: &str) -> Result<Vec<KeyHistoryEntry>> {
        let state = self.state.lock();
        let mut entries: Vec<KeyHistoryEntry> = state
            .history
            .iter()
            .filter(|h| h.address == address)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        entries.sort_by_key(|h| h.timestamp);
        Ok(entries)
    }

    fn commit(&self, transition: &KeyTransition) -> Result<()> {
        let mut state = self.state.lock();

        let has_active = state
            .keys
            .iter()
            .any(|k| k.address == transition.address && k.is_active);
        if transition.insert.is_some() && has_active && !transition.deactivate_current {
            return Err(Error::DatabaseError(format!(
                "{} already has an active key",
                transition.address
            )));
        }

        if transition.deactivate_current {
            for key in state
                .keys
                .iter_mut()
                .filter(|k| k.address == transition.address && k.is_active)
            {
                key.is_active = false;
                key.updated_at = transition.history.timestamp;
            }
        }

        if let Some(key) = &transition.insert {
            state.keys.push(key.clone());
        }
        state.history.push(transition.history.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::types::KeyAction;

    fn row(address: &str, public_key: &str, ts: i64) -> UserEncryptionKey {
        UserEncryptionKey {
            id: uuid::Uuid::new_v4().to_string(),
            address: address.into(),
            public_key: public_key.into(),
            signed_message: None,
            device_id: None,
            label: None,
            is_active: true,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn entry(address: &str, public_key: &str, action: KeyAction, ts: i64) -> KeyHistoryEntry {
        KeyHistoryEntry {
            address: address.into(),
            public_key: public_key.into(),
            action,
            reason: None,
            previous_public_key: None,
            timestamp: ts,
        }
    }

    #[test]
    fn test_commit_refuses_second_active_row() {
        let store = MemoryKeyStore::new();
        store
            .commit(&KeyTransition {
                address: "a".into(),
                deactivate_current: false,
                insert: Some(row("a", "k1", 1)),
                history: entry("a", "k1", KeyAction::Created, 1),
            })
            .unwrap();

        let result = store.commit(&KeyTransition {
            address: "a".into(),
            deactivate_current: false,
            insert: Some(row("a", "k2", 2)),
            history: entry("a", "k2", KeyAction::Created, 2),
        });
        assert!(result.is_err());
        // Nothing from the failed transition was applied
        assert_eq!(store.history("a").unwrap().len(), 1);
        assert_eq!(store.keys("a").unwrap().len(), 1);
    }

    #[test]
    fn test_history_ties_keep_insertion_order() {
        let store = MemoryKeyStore::new();
        for (i, key) in ["k1", "k2", "k3"].iter().enumerate() {
            store
                .commit(&KeyTransition {
                    address: "a".into(),
                    deactivate_current: i > 0,
                    insert: Some(row("a", key, 5)),
                    history: entry("a", key, KeyAction::Rotated, 5),
                })
                .unwrap();
        }
        let keys: Vec<_> = store.history("a").unwrap().into_iter().map(|h| h.public_key).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
        assert_eq!(store.active("a").unwrap().unwrap().public_key, "k3");
        assert_eq!(store.keys("a").unwrap()[0].public_key, "k3");
    }
}
