//! SQLite persistence for the dedup cache.
//!
//! Fingerprints are stored with a sequence number so the insertion order,
//! and with it the eviction order, survives between sessions.

use std::fs;
use std::path::Path;

use rusqlite::{Connection, params};
use thiserror::Error;
use tracing::{debug, info};

use crate::e621::cache::DedupCache;

#[derive(Error, Debug)]
pub(crate) enum CacheStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub(crate) type CacheStoreResult<T> = Result<T, CacheStoreError>;

pub(crate) struct CacheStore {
    db_connection: Connection,
}

impl CacheStore {
    /// Opens or creates the store at `db_path`.
    pub(crate) fn open(db_path: &Path) -> CacheStoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let db_connection = Connection::open(db_path)?;
        db_connection.execute(
            "CREATE TABLE IF NOT EXISTS fingerprints (
                seq INTEGER PRIMARY KEY,
                fingerprint TEXT NOT NULL UNIQUE
            )",
            [],
        )?;

        Ok(Self { db_connection })
    }

    /// Loads the cache, dropping the oldest entries beyond `capacity`.
    pub(crate) fn load(&self, capacity: usize) -> CacheStoreResult<DedupCache> {
        let mut stmt = self
            .db_connection
            .prepare("SELECT fingerprint FROM fingerprints ORDER BY seq ASC")?;
        let entries = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let stored = entries.len();
        let cache = DedupCache::from_entries(capacity, entries);
        if stored > cache.len() {
            info!(
                "Cache capacity is {}, dropped the {} oldest of {} stored fingerprints",
                cache.capacity(),
                stored - cache.len(),
                stored
            );
        }
        debug!("Loaded {} cached fingerprints", cache.len());
        Ok(cache)
    }

    /// Replaces the stored fingerprints with the contents of `cache`.
    pub(crate) fn save(&mut self, cache: &DedupCache) -> CacheStoreResult<()> {
        let tx = self.db_connection.transaction()?;
        tx.execute("DELETE FROM fingerprints", [])?;
        {
            let mut insert = tx.prepare("INSERT INTO fingerprints (seq, fingerprint) VALUES (?1, ?2)")?;
            for (seq, fingerprint) in cache.iter().enumerate() {
                insert.execute(params![seq as i64, fingerprint])?;
            }
        }
        tx.commit()?;

        debug!("Saved {} cached fingerprints", cache.len());
        Ok(())
    }
}
