//! Hierarchical paths and symbolic links over a partition/sort-key table.
//!
//! A [`Tree`] lets callers store, fetch, link, list, and delete values
//! addressed by ordered path components such as
//! `["Accounts", "12345"]`, using nothing but the point lookup and
//! single-partition range scan a [`TableStore`](dyntree_store::TableStore)
//! provides.
//!
//! # Row Layout
//!
//! One reserved delimiter (default `¦`) does three jobs:
//!
//! - joins path components into partition keys
//! - is the sort key of the row that holds a path's own value
//! - names the single attribute that marks a row as a link
//!
//! Storing at a path of N components writes N edge rows (parent directory
//! partition, child name) and one object row. Listing a directory is then a
//! scan of one partition, and fetching a value is one point read per link
//! hop. See [`path`] for the exact keys.
//!
//! # Limits
//!
//! 1. Multi-row writes are not atomic. A failure between batch chunks can
//!    leave edge rows without their object row.
//! 2. `delete` removes only the leaf's object row and its parent edge.
//!    Ancestors and former children are left in place.
//! 3. Link chains longer than `max_link_hops` fail with
//!    [`TreeError::TooManyRedirects`]; cycles therefore terminate.

pub mod batch;
pub mod codec;
pub mod config;
pub mod error;
pub mod link;
pub mod path;
pub mod tree;

// Re-export primary types at crate root for ergonomic imports.
pub use batch::{BatchReport, BatchWriter};
pub use codec::{CodecError, Storable};
pub use config::{RetryPolicy, TreeConfig, DEFAULT_DELIMITER, DEFAULT_MAX_LINK_HOPS, DEFAULT_TABLE_NAME};
pub use error::{Result, TreeError};
pub use link::{Entry, LinkResolver};
pub use path::PathCodec;
pub use tree::Tree;
