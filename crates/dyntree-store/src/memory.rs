use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::TableStore;
use crate::types::{
    Item, Page, QueryRequest, Row, RowKey, TableSchema, WriteRequest, MAX_BATCH_WRITE_ITEMS,
};

/// Tuning knobs for [`InMemoryTableStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryStoreConfig {
    /// Maximum rows returned by one `query_page` call.
    pub page_size: usize,
    /// Maximum requests accepted by one `batch_write` call.
    pub max_batch_items: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_batch_items: MAX_BATCH_WRITE_ITEMS,
        }
    }
}

/// Serializable copy of every table in a store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub tables: BTreeMap<String, TableSnapshot>,
}

/// Serializable copy of one table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

struct MemoryTable {
    schema: TableSchema,
    rows: BTreeMap<RowKey, Item>,
}

/// Scripted failures, consumed as batch calls arrive.
#[derive(Debug, Default)]
struct Faults {
    /// Remaining batch calls that apply only half their requests.
    throttled_batches: usize,
    /// Successful batch calls left before one fails outright.
    fail_batch_after: Option<usize>,
    /// Whether every query fails.
    fail_queries: bool,
    /// Successful queries left before one fails outright.
    fail_query_after: Option<usize>,
}

/// In-memory, ordered-map table store.
///
/// Intended for tests and embedding. Rows live in one `BTreeMap` per table
/// keyed by `(partition, sort)`, so a partition scan is a contiguous range
/// in sort-key byte order. Fault injection hooks let tests exercise the
/// unprocessed-item and hard-failure paths of batch writers.
pub struct InMemoryTableStore {
    tables: RwLock<HashMap<String, MemoryTable>>,
    faults: Mutex<Faults>,
    config: MemoryStoreConfig,
    batch_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl InMemoryTableStore {
    /// Create a new empty store with default limits.
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Create a new empty store with the given limits.
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            config,
            batch_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot, config: MemoryStoreConfig) -> Self {
        let tables = snapshot
            .tables
            .into_iter()
            .map(|(name, table)| {
                let rows = table
                    .rows
                    .into_iter()
                    .map(|row| (row.key, row.attributes))
                    .collect();
                (
                    name,
                    MemoryTable {
                        schema: table.schema,
                        rows,
                    },
                )
            })
            .collect();
        Self {
            tables: RwLock::new(tables),
            ..Self::with_config(config)
        }
    }

    /// Copy every table into a serializable snapshot.
    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        let tables = self.read_tables()?;
        let tables = tables
            .iter()
            .map(|(name, table)| {
                let rows = table
                    .rows
                    .iter()
                    .map(|(key, attributes)| Row::new(key.clone(), attributes.clone()))
                    .collect();
                (
                    name.clone(),
                    TableSnapshot {
                        schema: table.schema.clone(),
                        rows,
                    },
                )
            })
            .collect();
        Ok(StoreSnapshot { tables })
    }

    /// Every row of a table in key order.
    pub fn rows(&self, table: &str) -> StoreResult<Vec<Row>> {
        let tables = self.read_tables()?;
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.rows
            .iter()
            .map(|(key, attributes)| Row::new(key.clone(), attributes.clone()))
            .collect())
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> StoreResult<usize> {
        let tables = self.read_tables()?;
        tables
            .get(table)
            .map(|t| t.rows.len())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> StoreResult<Vec<String>> {
        let tables = self.read_tables()?;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Make the next `n` batch writes apply only the first half of their
    /// requests and report the remainder as unprocessed.
    pub fn throttle_batches(&self, n: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.throttled_batches = n;
        }
    }

    /// Let `n` more batch writes succeed, then fail the next one with
    /// [`StoreError::Backend`].
    pub fn fail_batch_after(&self, n: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_batch_after = Some(n);
        }
    }

    /// Make every partition query fail (or stop failing).
    pub fn fail_queries(&self, fail: bool) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_queries = fail;
        }
    }

    /// Let `n` more queries succeed, then fail the next one with
    /// [`StoreError::Backend`].
    pub fn fail_queries_after(&self, n: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_query_after = Some(n);
        }
    }

    /// Number of `batch_write` calls received so far.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Number of `query_page` calls received so far.
    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    fn read_tables(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<String, MemoryTable>>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_tables(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, MemoryTable>>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Consume scripted faults for one batch call. Returns how many of the
    /// `len` requests may be applied.
    fn admit_batch(&self, len: usize) -> StoreResult<usize> {
        let mut faults = self.faults.lock().map_err(|_| StoreError::LockPoisoned)?;
        match faults.fail_batch_after {
            Some(0) => {
                faults.fail_batch_after = None;
                return Err(StoreError::Backend("injected batch write failure".into()));
            }
            Some(n) => faults.fail_batch_after = Some(n - 1),
            None => {}
        }
        if faults.throttled_batches > 0 {
            faults.throttled_batches -= 1;
            return Ok(len / 2);
        }
        Ok(len)
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TableStore for InMemoryTableStore {
    fn create_table(&self, table: &str, schema: &TableSchema) -> StoreResult<()> {
        let mut tables = self.write_tables()?;
        if tables.contains_key(table) {
            return Err(StoreError::TableAlreadyExists(table.to_string()));
        }
        tables.insert(
            table.to_string(),
            MemoryTable {
                schema: schema.clone(),
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn get(&self, table: &str, key: &RowKey) -> StoreResult<Option<Row>> {
        let tables = self.read_tables()?;
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.rows
            .get(key)
            .map(|attributes| Row::new(key.clone(), attributes.clone())))
    }

    fn put(&self, table: &str, row: Row) -> StoreResult<()> {
        let mut tables = self.write_tables()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        t.rows.insert(row.key, row.attributes);
        Ok(())
    }

    fn delete(&self, table: &str, key: &RowKey) -> StoreResult<bool> {
        let mut tables = self.write_tables()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.rows.remove(key).is_some())
    }

    fn batch_write(
        &self,
        table: &str,
        mut requests: Vec<WriteRequest>,
    ) -> StoreResult<Vec<WriteRequest>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        if requests.len() > self.config.max_batch_items {
            return Err(StoreError::BatchTooLarge {
                max: self.config.max_batch_items,
                actual: requests.len(),
            });
        }
        let mut seen = HashSet::with_capacity(requests.len());
        for request in &requests {
            let key = request.key();
            if !seen.insert(key) {
                return Err(StoreError::DuplicateKeyInBatch {
                    partition: key.partition.clone(),
                    sort: key.sort.clone(),
                });
            }
        }

        let mut tables = self.write_tables()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        // Faults are only spent on calls that reach an existing table.
        let admitted = self.admit_batch(requests.len())?;
        let unprocessed = requests.split_off(admitted);
        for request in requests {
            match request {
                WriteRequest::Put(row) => {
                    t.rows.insert(row.key, row.attributes);
                }
                WriteRequest::Delete(key) => {
                    t.rows.remove(&key);
                }
            }
        }

        debug!(
            table,
            applied = admitted,
            unprocessed = unprocessed.len(),
            "memory batch write"
        );
        Ok(unprocessed)
    }

    fn query_page(&self, table: &str, request: &QueryRequest) -> StoreResult<Page> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut faults = self.faults.lock().map_err(|_| StoreError::LockPoisoned)?;
            if faults.fail_queries {
                return Err(StoreError::Backend("injected query failure".into()));
            }
            match faults.fail_query_after {
                Some(0) => {
                    faults.fail_query_after = None;
                    return Err(StoreError::Backend("injected query failure".into()));
                }
                Some(n) => faults.fail_query_after = Some(n - 1),
                None => {}
            }
        }

        let tables = self.read_tables()?;
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let limit = request
            .limit
            .unwrap_or(self.config.page_size)
            .min(self.config.page_size)
            .max(1);
        let lower = match &request.exclusive_start {
            Some(sort) => Bound::Excluded(RowKey::new(request.partition.clone(), sort.clone())),
            None => Bound::Included(RowKey::new(request.partition.clone(), String::new())),
        };

        let mut matching = t
            .rows
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.partition == request.partition);

        let rows: Vec<Row> = matching
            .by_ref()
            .take(limit)
            .map(|(key, attributes)| Row::new(key.clone(), attributes.clone()))
            .collect();
        let more = matching.next().is_some();
        let last_evaluated_key = if more {
            rows.last().map(|row| row.key.sort.clone())
        } else {
            None
        };

        Ok(Page {
            rows,
            last_evaluated_key,
        })
    }
}

impl std::fmt::Debug for InMemoryTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.tables.read().map(|t| t.len()).unwrap_or(0);
        f.debug_struct("InMemoryTableStore")
            .field("table_count", &count)
            .field("config", &self.config)
            .finish()
    }
}
