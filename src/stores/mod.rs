mod episodes;
mod performance;
mod strategy;

pub use episodes::EpisodicMemory;
pub use performance::PerformanceTracker;
pub use strategy::{OutcomeUpdate, StrategyStatistics, StrategyStore, TopStrategy};

use crate::error::{KubemendError, Result};
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Append-only tables are keyed by a monotonic sequence so iteration order is
/// insertion order.
pub(crate) type SeqTable = TableDefinition<'static, u64, &'static [u8]>;
pub(crate) type KeyTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// One embedded database file. Stores wrap their `redb::Database` in a
/// `RwLock<Arc<…>>` so a nuclear reset can unlink the file and swap in a
/// fresh handle while in-flight operations finish on the old one.
pub(crate) struct StoreDb {
    path: PathBuf,
    db: RwLock<Arc<Database>>,
}

impl StoreDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)
            .map_err(|e| KubemendError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;
        info!("Opened store at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            db: RwLock::new(Arc::new(db)),
        })
    }

    fn handle(&self) -> Result<Arc<Database>> {
        self.db
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| KubemendError::StoreUnavailable("store lock poisoned".to_string()))
    }

    /// Synchronous access for startup paths (table creation, resets) where
    /// no runtime is guaranteed yet.
    pub fn run_sync<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.handle()?;
        f(&db)
    }

    /// Run a blocking redb transaction off the async runtime, the way the
    /// storage layer in rust-self-learning-memory does.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.handle()?;
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| KubemendError::StoreUnavailable(format!("store task failed: {}", e)))?
    }

    /// Hard reset: delete the backing file and re-initialise an empty
    /// database in its place.
    pub fn nuke(&self) -> Result<()> {
        let mut guard = self
            .db
            .write()
            .map_err(|_| KubemendError::StoreUnavailable("store lock poisoned".to_string()))?;

        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        let fresh = Database::create(&self.path).map_err(|e| {
            KubemendError::StoreUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        *guard = Arc::new(fresh);
        info!("Nuclear reset of store at {}", self.path.display());
        Ok(())
    }
}

pub(crate) fn store_err(context: &str, err: impl std::fmt::Display) -> KubemendError {
    KubemendError::StoreUnavailable(format!("{}: {}", context, err))
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Next sequence key for an append-only table.
pub(crate) fn next_seq(table: &impl ReadableTable<u64, &'static [u8]>) -> Result<u64> {
    let last = table
        .last()
        .map_err(|e| store_err("read last key", e))?
        .map(|(key, _)| key.value());
    Ok(last.map(|k| k + 1).unwrap_or(0))
}

/// Ensure tables exist so later read transactions can open them.
pub(crate) fn create_tables(db: &Database, seq: &[SeqTable], keyed: &[KeyTable]) -> Result<()> {
    let txn = db
        .begin_write()
        .map_err(|e| store_err("begin write", e))?;
    for table in seq {
        txn.open_table(*table)
            .map_err(|e| store_err("create table", e))?;
    }
    for table in keyed {
        txn.open_table(*table)
            .map_err(|e| store_err("create table", e))?;
    }
    txn.commit().map_err(|e| store_err("commit", e))?;
    Ok(())
}

/// Soft reset: drop and recreate the given tables.
pub(crate) fn clear_tables(db: &Database, seq: &[SeqTable], keyed: &[KeyTable]) -> Result<()> {
    let txn = db
        .begin_write()
        .map_err(|e| store_err("begin write", e))?;
    for table in seq {
        txn.delete_table(*table)
            .map_err(|e| store_err("delete table", e))?;
        txn.open_table(*table)
            .map_err(|e| store_err("recreate table", e))?;
    }
    for table in keyed {
        txn.delete_table(*table)
            .map_err(|e| store_err("delete table", e))?;
        txn.open_table(*table)
            .map_err(|e| store_err("recreate table", e))?;
    }
    txn.commit().map_err(|e| store_err("commit", e))?;
    Ok(())
}

/// Collect every value of an append-only table in insertion order.
pub(crate) fn read_seq_values<T: DeserializeOwned>(
    db: &Database,
    table_def: SeqTable,
) -> Result<Vec<T>> {
    let txn = db.begin_read().map_err(|e| store_err("begin read", e))?;
    let table = txn
        .open_table(table_def)
        .map_err(|e| store_err("open table", e))?;

    let mut values = Vec::new();
    for entry in table.iter().map_err(|e| store_err("iterate", e))? {
        let (_, value) = entry.map_err(|e| store_err("read entry", e))?;
        values.push(decode(value.value())?);
    }
    Ok(values)
}
