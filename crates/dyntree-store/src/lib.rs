//! Table storage adapter for dyntree.
//!
//! This crate models a backing store that offers exactly two access
//! patterns: exact lookup by a composite `(partition, sort)` key, and an
//! ordered range scan of every row sharing one partition key. Hierarchical
//! addressing is built on top of it by `dyntree-core`; nothing here knows
//! about paths.
//!
//! # Row Model
//!
//! - [`RowKey`] -- the composite `(partition, sort)` primary key
//! - [`Row`] -- a key plus its non-key attributes ([`Item`])
//! - [`AttributeValue`] -- the tagged attribute representation
//! - [`WriteRequest`] -- one put or delete inside a batch
//!
//! # Storage Backends
//!
//! All backends implement the [`TableStore`] trait:
//!
//! - [`InMemoryTableStore`] -- ordered-map store with fault injection for tests
//! - [`FileTableStore`] -- in-memory store persisted as a JSON snapshot
//!
//! # Contract
//!
//! 1. Batch writes accept at most [`MAX_BATCH_WRITE_ITEMS`] requests and may
//!    hand back a subset as unprocessed; the caller resubmits them.
//! 2. A partition query returns rows in ascending sort-key byte order,
//!    one page at a time.
//! 3. Creating a table that already exists fails with
//!    [`StoreError::TableAlreadyExists`]; callers decide whether that matters.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;
pub mod types;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use file::FileTableStore;
pub use memory::{InMemoryTableStore, MemoryStoreConfig, StoreSnapshot};
pub use traits::TableStore;
pub use types::{
    AttributeValue, Item, KeyAttribute, KeyType, Page, QueryRequest, Row, RowKey, TableSchema,
    WriteRequest, MAX_BATCH_WRITE_ITEMS,
};
