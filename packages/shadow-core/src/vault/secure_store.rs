//! # Secret Storage
//!
//! Where encrypted key records live between sessions.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SECRET STORAGE                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SecretStore trait                                                     │
//! │  • store(name, value)   - Write or overwrite a record                  │
//! │  • retrieve(name)       - Read a record                                │
//! │  • delete(name)         - Remove a record                              │
//! │  • exists(name)         - Check for a record                           │
//! │                                                                         │
//! │  ┌───────────────────┐        ┌───────────────────┐                    │
//! │  │ MemorySecretStore │        │ FileSecretStore   │                    │
//! │  │                   │        │                   │                    │
//! │  │ - Per-instance    │        │ - One file per    │                    │
//! │  │   map, tests and  │        │   record under a  │                    │
//! │  │   ephemeral use   │        │   directory       │                    │
//! │  └───────────────────┘        └───────────────────┘                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stores only ever see records that are already password-encrypted. The
//! store is injected into each vault; there is no process-wide instance.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Record names used by the vault
pub mod names {
    /// The encrypted encryption keypair
    pub const ENCRYPTION_KEY_PAIR: &str = "shadow.vault.keypair";
}

/// Persistence backend for encrypted secrets
pub trait SecretStore: Send + Sync {
    /// Write `value` under `name`, replacing any previous value
    fn store(&self, name: &str, value: &[u8]) -> Result<()>;

    /// Read the value stored under `name`
    fn retrieve(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Remove `name`; returns whether anything was removed
    fn delete(&self, name: &str) -> Result<bool>;

    /// Whether a value is stored under `name`
    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.retrieve(name)?.is_some())
    }
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// In-memory secret store
#[derive(Default)]
pub struct MemorySecretStore {
    memory: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemorySecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn store(&self, name: &str, value: &[u8]) -> Result<()> {
        let mut storage = self.memory.write();
        storage.insert(name.to_string(), Zeroizing::new(value.to_vec()));
        Ok(())
    }

    fn retrieve(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let storage = self.memory.read();
        Ok(storage.get(name).cloned())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let mut storage = self.memory.write();
        Ok(storage.remove(name).is_some())
    }

    fn exists(&self, name: &str) -> Result<bool> {
        let storage = self.memory.read();
        Ok(storage.contains_key(name))
    }
}

// ============================================================================
// FILE-BACKED
// ============================================================================

/// Secret store keeping one file per record in a directory.
///
/// File names are the hex encoding of the record name, so arbitrary names
/// cannot escape the directory.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.secret", hex::encode(name.as_bytes())))
    }
}

impl SecretStore for FileSecretStore {
    fn store(&self, name: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(name);
        // Write to a sibling file first so a crash never leaves a torn record
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, value)
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    fn retrieve(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        match std::fs::read(self.path_for(name)) {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageReadError(e.to_string())),
        }
    }

    fn delete(&self, name: &str) -> Result<bool> {
        match std::fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::StorageWriteError(e.to_string())),
        }
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.path_for(name).is_file())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn SecretStore) {
        assert!(!store.exists("record").unwrap());
        assert!(store.retrieve("record").unwrap().is_none());

        store.store("record", b"first").unwrap();
        assert!(store.exists("record").unwrap());
        assert_eq!(&**store.retrieve("record").unwrap().unwrap(), b"first");

        store.store("record", b"second").unwrap();
        assert_eq!(&**store.retrieve("record").unwrap().unwrap(), b"second");

        assert!(store.delete("record").unwrap());
        assert!(!store.delete("record").unwrap());
        assert!(!store.exists("record").unwrap());
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemorySecretStore::new());
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FileSecretStore::open(dir.path()).unwrap());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileSecretStore::open(dir.path()).unwrap();
            store.store(names::ENCRYPTION_KEY_PAIR, b"persisted").unwrap();
        }
        let store = FileSecretStore::open(dir.path()).unwrap();
        assert_eq!(
            &**store.retrieve(names::ENCRYPTION_KEY_PAIR).unwrap().unwrap(),
            b"persisted"
        );
    }

    #[test]
    fn test_file_store_names_stay_inside_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::open(dir.path()).unwrap();
        store.store("../escape", b"x").unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_stores_are_independent() {
        let a = MemorySecretStore::new();
        let b = MemorySecretStore::new();
        a.store("record", b"a").unwrap();
        assert!(!b.exists("record").unwrap());
    }
}
