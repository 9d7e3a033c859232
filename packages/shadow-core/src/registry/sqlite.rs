//! # SQLite Key Store
//!
//! Durable [`KeyStore`] backed by rusqlite.
//!
//! Every transition runs inside one SQLite transaction, and the partial
//! unique index on `(address) WHERE is_active = 1` rejects a second active
//! row even if a caller bypasses the registry's per-address lock.

use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;

use super::schema;
use super::store::KeyStore;
use super::types::{KeyAction, KeyHistoryEntry, KeyTransition, UserEncryptionKey};
use crate::error::{Error, Result};

impl ToSql for KeyAction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for KeyAction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: Error| FromSqlError::Other(Box::new(e)))
    }
}

const KEY_COLUMNS: &str =
    "id, address, public_key, signed_message, device_id, label, is_active, created_at, updated_at";

fn row_to_key(row: &Row<'_>) -> rusqlite::Result<UserEncryptionKey> {
    Ok(UserEncryptionKey {
        id: row.get(0)?,
        address: row.get(1)?,
        public_key: row.get(2)?,
        signed_message: row.get(3)?,
        device_id: row.get(4)?,
        label: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_history(row: &Row<'_>) -> rusqlite::Result<KeyHistoryEntry> {
    Ok(KeyHistoryEntry {
        address: row.get(0)?,
        public_key: row.get(1)?,
        action: row.get(2)?,
        reason: row.get(3)?,
        previous_public_key: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

/// SQLite-backed key store
pub struct SqliteKeyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyStore {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database.
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Registry schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::DatabaseError(format!(
                    "Registry schema version {} is newer than supported {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Registry schema version: {}", v);
            }
        }

        Ok(())
    }
}

impl KeyStore for SqliteKeyStore {
    fn active(&self, address: &str) -> Result<Option<UserEncryptionKey>> {
        let conn = self.conn.lock();
        let key = conn
            .query_row(
                &format!(
                    "SELECT {} FROM user_encryption_keys WHERE address = ?1 AND is_active = 1",
                    KEY_COLUMNS
                ),
                params![address],
                row_to_key,
            )
            .optional()?;
        Ok(key)
    }

    fn keys(&self, address: &str) -> Result<Vec<UserEncryptionKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM user_encryption_keys WHERE address = ?1 ORDER BY created_at DESC, rowid DESC",
            KEY_COLUMNS
        ))?;
        let keys = stmt
            .query_map(params![address], row_to_key)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    fn history(&self, address: &str) -> Result<Vec<KeyHistoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT address, public_key, action, reason, previous_public_key, timestamp
             FROM key_history WHERE address = ?1 ORDER BY timestamp ASC, id ASC",
        )?;
        let entries = stmt
            .query_map(params![address], row_to_history)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn commit(&self, transition: &KeyTransition) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        if transition.deactivate_current {
            tx.execute(
                "UPDATE user_encryption_keys SET is_active = 0, updated_at = ?2
                 WHERE address = ?1 AND is_active = 1",
                params![transition.address, transition.history.timestamp],
            )?;
        }

        if let Some(key) = &transition.insert {
            tx.execute(
                &format!(
                    "INSERT INTO user_encryption_keys ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    KEY_COLUMNS
                ),
                params![
                    key.id,
                    key.address,
                    key.public_key,
                    key.signed_message,
                    key.device_id,
                    key.label,
                    key.is_active,
                    key.created_at,
                    key.updated_at,
                ],
            )?;
        }

        let entry = &transition.history;
        tx.execute(
            "INSERT INTO key_history (address, public_key, action, reason, previous_public_key, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.address,
                entry.public_key,
                entry.action,
                entry.reason,
                entry.previous_public_key,
                entry.timestamp,
            ],
        )?;

        // Dropping an uncommitted transaction rolls it back
        tx.commit()?;
        Ok(())
    }
}
