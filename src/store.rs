//! Persistent key-value storage for cached audio blobs.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// Get/put-by-key capability the loader needs from a store.
pub trait AssetStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Could not create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not open store {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("Store {name} is at version {found}, newer than requested {requested}")]
    VersionTooNew {
        name: String,
        found: u32,
        requested: u32,
    },
    #[error("Store upgrade to version {version} failed: {source}")]
    Upgrade {
        version: u32,
        source: rusqlite::Error,
    },
    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),
    #[error("Reading key {key} failed: {source}")]
    Read {
        key: String,
        source: rusqlite::Error,
    },
    #[error("Writing key {key} failed: {source}")]
    Write {
        key: String,
        source: rusqlite::Error,
    },
}

/// SQLite-backed store: one database file, one collection table.
pub struct SqliteStore {
    connection: Connection,
    name: String,
    collection: String,
}

impl SqliteStore {
    /// Open (or create) the database and bring it up to `version`.
    ///
    /// The upgrade step creates the collection table, so a fresh file and a
    /// file from an older version both end up with the table present.
    pub fn open(
        path: impl AsRef<Path>,
        name: &str,
        version: u32,
        collection: &str,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        validate_collection(collection)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let connection = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self {
            connection,
            name: name.to_owned(),
            collection: collection.to_owned(),
        };
        store.upgrade(version)?;
        Ok(store)
    }

    /// In-memory store, used by tests and when no data directory exists.
    pub fn open_in_memory(name: &str, version: u32, collection: &str) -> Result<Self, StoreError> {
        validate_collection(collection)?;
        let connection = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        let store = Self {
            connection,
            name: name.to_owned(),
            collection: collection.to_owned(),
        };
        store.upgrade(version)?;
        Ok(store)
    }

    pub fn version(&self) -> Result<u32, StoreError> {
        self.connection
            .query_row("PRAGMA user_version", [], |row| row.get::<_, u32>(0))
            .map_err(|source| StoreError::Open {
                path: PathBuf::from(&self.name),
                source,
            })
    }

    fn upgrade(&self, requested: u32) -> Result<(), StoreError> {
        let found = self.version()?;
        if found > requested {
            return Err(StoreError::VersionTooNew {
                name: self.name.clone(),
                found,
                requested,
            });
        }
        if found == requested {
            return Ok(());
        }
        tracing::info!(
            store = %self.name,
            from = found,
            to = requested,
            "upgrading store"
        );
        let upgrade_error = |source| StoreError::Upgrade {
            version: requested,
            source,
        };
        // rolls back on drop if any step fails
        let tx = self.connection.unchecked_transaction().map_err(upgrade_error)?;
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                 key TEXT PRIMARY KEY,
                 value BLOB NOT NULL
             );
             PRAGMA user_version = {requested};",
            self.collection
        ))
        .map_err(upgrade_error)?;
        tx.commit().map_err(upgrade_error)
    }
}

impl AssetStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let sql = format!("SELECT value FROM \"{}\" WHERE key = ?1", self.collection);
        self.connection
            .query_row(&sql, params![key], |row| row.get::<_, Vec<u8>>(0))
            .optional()
            .map_err(|source| StoreError::Read {
                key: key.to_owned(),
                source,
            })
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO \"{}\" (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            self.collection
        );
        self.connection
            .execute(&sql, params![key, value])
            .map(|_| ())
            .map_err(|source| StoreError::Write {
                key: key.to_owned(),
                source,
            })
    }
}

// Table names can't be bound as parameters.
fn validate_collection(collection: &str) -> Result<(), StoreError> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(collection.to_owned()))
    }
}
