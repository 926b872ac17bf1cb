use std::path::Path;

use redb::{
    Database,
    ReadOnlyDatabase,
    ReadTransaction,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
    TableError,
};

use crate::error::{Error, Result};

const NAMES: TableDefinition<&str, &[u8]> = TableDefinition::new("names");
const WORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("words");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Rough per-entry footprint used to turn a document-count hint into a
/// page cache size.
const BYTES_PER_ENTRY: usize = 4096;
const MIN_CACHE_SIZE: usize = 4 * 1024 * 1024;

/// Which of the two index stores a [`Store`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Decimal document id -> filename.
    Names,
    /// Word -> serialized posting list.
    Words,
}

impl StoreKind {
    pub fn label(self) -> &'static str {
        match self {
            StoreKind::Names => "names",
            StoreKind::Words => "words",
        }
    }

    fn table(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            StoreKind::Names => NAMES,
            StoreKind::Words => WORDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Write only if the key is absent.
    Insert,
    /// Overwrite any existing value.
    Replace,
}

enum Handle {
    ReadWrite(Database),
    /// Shared open; any number of these may coexist on one file.
    ReadOnly(ReadOnlyDatabase),
}

/// An ordered key/value store backed by a single redb file.
///
/// Each operation runs in its own transaction except [`Store::update_batch`],
/// which applies a whole set of read-modify-write steps atomically.
pub struct Store {
    db: Handle,
    kind: StoreKind,
}

impl Store {
    /// Open or create a store.
    ///
    /// `capacity` is the approximate number of documents the index will
    /// hold; it only sizes the page cache. A read-only open requires the
    /// file to exist and never creates tables.
    pub fn open(
        path: &Path,
        kind: StoreKind,
        capacity: usize,
        read_only: bool,
    ) -> Result<Self> {
        let cache_size = capacity
            .saturating_mul(BYTES_PER_ENTRY)
            .max(MIN_CACHE_SIZE);
        let mut builder = Database::builder();
        builder.set_cache_size(cache_size);

        let db = if read_only {
            if !path.exists() {
                return Err(Error::NotFound {
                    kind: "index store",
                    name: path.display().to_string(),
                });
            }
            Handle::ReadOnly(builder.open_read_only(path)?)
        } else {
            let db = builder.create(path)?;

            let txn = db.begin_write()?;
            txn.open_table(kind.table())?;
            if kind == StoreKind::Names {
                txn.open_table(SETTINGS)?;
            }
            txn.commit()?;
            Handle::ReadWrite(db)
        };

        tracing::debug!(
            store = kind.label(),
            path = %path.display(),
            read_only,
            "opened store"
        );

        Ok(Self { db, kind })
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.db, Handle::ReadOnly(_))
    }

    fn writable(&self) -> Result<&Database> {
        match &self.db {
            Handle::ReadWrite(db) => Ok(db),
            Handle::ReadOnly(_) => Err(Error::ReadOnly(self.kind.label())),
        }
    }

    fn begin_read(&self) -> Result<ReadTransaction> {
        let txn = match &self.db {
            Handle::ReadWrite(db) => db.begin_read()?,
            Handle::ReadOnly(db) => db.begin_read()?,
        };
        Ok(txn)
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let txn = self.begin_read()?;
        let table = match txn.open_table(self.kind.table()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    /// Store `value` under `key`. Returns `false` when `mode` is
    /// [`PutMode::Insert`] and the key was already present.
    pub fn put(&self, key: &str, value: &[u8], mode: PutMode) -> Result<bool> {
        let txn = self.writable()?.begin_write()?;
        let written = {
            let mut table = txn.open_table(self.kind.table())?;
            if mode == PutMode::Insert && table.get(key)?.is_some() {
                false
            } else {
                table.insert(key, value)?;
                true
            }
        };
        txn.commit()?;
        Ok(written)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let txn = self.writable()?.begin_write()?;
        let removed = {
            let mut table = txn.open_table(self.kind.table())?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Visit every entry in key order inside a single read transaction.
    pub fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&str, &[u8]) -> Result<()>,
    {
        let txn = self.begin_read()?;
        let table = match txn.open_table(self.kind.table()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in table.iter()? {
            let (k, v) = entry?;
            f(k.value(), v.value())?;
        }
        Ok(())
    }

    /// Apply a read-modify-write step to each key in one write transaction.
    ///
    /// `f` receives the current value (if any) and returns the new value;
    /// `None` removes the key. Returns the number of keys written or removed.
    pub fn update_batch<K, F>(&self, keys: &[K], mut f: F) -> Result<usize>
    where
        K: AsRef<str>,
        F: FnMut(&str, Option<&[u8]>) -> Result<Option<Vec<u8>>>,
    {
        let db = self.writable()?;
        if keys.is_empty() {
            return Ok(0);
        }

        let txn = db.begin_write()?;
        let mut changed = 0;
        {
            let mut table = txn.open_table(self.kind.table())?;
            for key in keys {
                let key = key.as_ref();
                let current = table.get(key)?.map(|v| v.value().to_vec());
                match f(key, current.as_deref())? {
                    Some(value) => {
                        table.insert(key, value.as_slice())?;
                        changed += 1;
                    }
                    None if current.is_some() => {
                        table.remove(key)?;
                        changed += 1;
                    }
                    None => {}
                }
            }
        }
        txn.commit()?;
        Ok(changed)
    }

    pub fn len(&self) -> Result<u64> {
        let txn = self.begin_read()?;
        match txn.open_table(self.kind.table()) {
            Ok(table) => Ok(table.len()?),
            Err(TableError::TableDoesNotExist(_)) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Finish a write session by compacting the database file.
    pub fn close_and_reorganize(mut self) -> Result<()> {
        let Handle::ReadWrite(db) = &mut self.db else {
            return Ok(());
        };
        let compacted = db.compact()?;
        tracing::debug!(store = self.kind.label(), compacted, "reorganized");
        Ok(())
    }

    // -- Settings (names store only) --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.writable()?.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.begin_read()?;
        let table = match txn.open_table(SETTINGS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("kind", &self.kind)
            .field("read_only", &self.is_read_only())
            .finish_non_exhaustive()
    }
}
