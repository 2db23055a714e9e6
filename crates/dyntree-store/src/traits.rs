use std::sync::Arc;

use crate::error::StoreResult;
use crate::types::{Page, QueryRequest, Row, RowKey, TableSchema, WriteRequest};

/// Partition/sort-key table store.
///
/// All implementations must satisfy these invariants:
/// - Rows are addressed by `(partition, sort)`; a put replaces the whole row.
/// - `batch_write` applies some prefix-independent subset of its requests and
///   returns the rest as unprocessed. It never reports a request as
///   unprocessed after applying it.
/// - `query_page` returns rows of a single partition in ascending sort-key
///   byte order and hands back a resume key while rows remain.
/// - Hard failures are returned as `Err`; nothing is silently dropped.
pub trait TableStore: Send + Sync {
    /// Create a table with the given key schema.
    ///
    /// Returns [`StoreError::TableAlreadyExists`](crate::StoreError::TableAlreadyExists)
    /// if the table is already present.
    fn create_table(&self, table: &str, schema: &TableSchema) -> StoreResult<()>;

    /// Point read. Returns `Ok(None)` if no row exists at `key`.
    fn get(&self, table: &str, key: &RowKey) -> StoreResult<Option<Row>>;

    /// Point write, replacing any existing row at the same key.
    fn put(&self, table: &str, row: Row) -> StoreResult<()>;

    /// Point delete. Returns `true` if a row existed.
    fn delete(&self, table: &str, key: &RowKey) -> StoreResult<bool>;

    /// Apply a batch of puts and deletes.
    ///
    /// Returns the requests that were not applied this time (throttling or
    /// internal limits). An empty vector means the whole batch landed.
    fn batch_write(&self, table: &str, requests: Vec<WriteRequest>)
        -> StoreResult<Vec<WriteRequest>>;

    /// Fetch one page of rows from a partition.
    fn query_page(&self, table: &str, request: &QueryRequest) -> StoreResult<Page>;

    /// Scan a whole partition page by page.
    ///
    /// `on_page` receives each page's rows in order and returns `false` to
    /// stop; no further pages are fetched after that.
    fn query_pages(
        &self,
        table: &str,
        partition: &str,
        on_page: &mut dyn FnMut(&[Row]) -> bool,
    ) -> StoreResult<()> {
        let mut request = QueryRequest::new(partition);
        loop {
            let page = self.query_page(table, &request)?;
            if !on_page(&page.rows) {
                return Ok(());
            }
            match page.last_evaluated_key {
                Some(resume) => request.exclusive_start = Some(resume),
                None => return Ok(()),
            }
        }
    }
}

impl<T: TableStore + ?Sized> TableStore for Arc<T> {
    fn create_table(&self, table: &str, schema: &TableSchema) -> StoreResult<()> {
        (**self).create_table(table, schema)
    }

    fn get(&self, table: &str, key: &RowKey) -> StoreResult<Option<Row>> {
        (**self).get(table, key)
    }

    fn put(&self, table: &str, row: Row) -> StoreResult<()> {
        (**self).put(table, row)
    }

    fn delete(&self, table: &str, key: &RowKey) -> StoreResult<bool> {
        (**self).delete(table, key)
    }

    fn batch_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> StoreResult<Vec<WriteRequest>> {
        (**self).batch_write(table, requests)
    }

    fn query_page(&self, table: &str, request: &QueryRequest) -> StoreResult<Page> {
        (**self).query_page(table, request)
    }

    fn query_pages(
        &self,
        table: &str,
        partition: &str,
        on_page: &mut dyn FnMut(&[Row]) -> bool,
    ) -> StoreResult<()> {
        (**self).query_pages(table, partition, on_page)
    }
}
