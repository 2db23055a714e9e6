use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::memory::{InMemoryTableStore, MemoryStoreConfig, StoreSnapshot};
use crate::traits::TableStore;
use crate::types::{Page, QueryRequest, Row, RowKey, TableSchema, WriteRequest};

/// Table store persisted as a single JSON snapshot file.
///
/// Reads are served from memory. Every successful mutation rewrites the
/// snapshot through a temporary file in the same directory followed by an
/// atomic rename, so a crash leaves either the old or the new snapshot on
/// disk, never a torn one.
pub struct FileTableStore {
    path: PathBuf,
    inner: InMemoryTableStore,
    /// Serializes snapshot writers so renames land in mutation order.
    flush_lock: Mutex<()>,
}

impl FileTableStore {
    /// Open (or create) the snapshot at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_config(path, MemoryStoreConfig::default())
    }

    /// Open (or create) the snapshot at `path` with custom limits.
    pub fn open_with_config(path: impl AsRef<Path>, config: MemoryStoreConfig) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let inner = if path.exists() {
            let reader = BufReader::new(fs::File::open(&path)?);
            let snapshot: StoreSnapshot = serde_json::from_reader(reader)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            info!(
                path = %path.display(),
                tables = snapshot.tables.len(),
                "loaded table snapshot"
            );
            InMemoryTableStore::from_snapshot(snapshot, config)
        } else {
            debug!(path = %path.display(), "no snapshot yet; starting empty");
            InMemoryTableStore::with_config(config)
        };

        Ok(Self {
            path,
            inner,
            flush_lock: Mutex::new(()),
        })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory tables backing this store.
    pub fn inner(&self) -> &InMemoryTableStore {
        &self.inner
    }

    /// Write the current contents to disk.
    pub fn flush(&self) -> StoreResult<()> {
        let _guard = self.flush_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let snapshot = self.inner.snapshot()?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &snapshot)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        debug!(path = %self.path.display(), "snapshot written");
        Ok(())
    }
}

impl TableStore for FileTableStore {
    fn create_table(&self, table: &str, schema: &TableSchema) -> StoreResult<()> {
        self.inner.create_table(table, schema)?;
        self.flush()
    }

    fn get(&self, table: &str, key: &RowKey) -> StoreResult<Option<Row>> {
        self.inner.get(table, key)
    }

    fn put(&self, table: &str, row: Row) -> StoreResult<()> {
        self.inner.put(table, row)?;
        self.flush()
    }

    fn delete(&self, table: &str, key: &RowKey) -> StoreResult<bool> {
        let existed = self.inner.delete(table, key)?;
        if existed {
            self.flush()?;
        }
        Ok(existed)
    }

    fn batch_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> StoreResult<Vec<WriteRequest>> {
        let submitted = requests.len();
        let unprocessed = self.inner.batch_write(table, requests)?;
        if unprocessed.len() < submitted {
            self.flush()?;
        }
        Ok(unprocessed)
    }

    fn query_page(&self, table: &str, request: &QueryRequest) -> StoreResult<Page> {
        self.inner.query_page(table, request)
    }
}

impl std::fmt::Debug for FileTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTableStore")
            .field("path", &self.path)
            .field("inner", &self.inner)
            .finish()
    }
}
