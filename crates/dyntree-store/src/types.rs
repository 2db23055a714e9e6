use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest number of requests a single batch write may carry.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// A single attribute value.
///
/// Serializes in the externally tagged form (`{"S": "alice"}`,
/// `{"N": "42"}`), which is also the shape the file backend persists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// UTF-8 string.
    S(String),
    /// Number, kept as its decimal text so no precision is lost.
    N(String),
    /// Raw bytes.
    B(Vec<u8>),
    /// Boolean.
    Bool(bool),
    /// Explicit null.
    Null,
    /// Ordered list of values.
    L(Vec<AttributeValue>),
    /// Nested map of values.
    M(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Returns the string payload if this is an `S` value.
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric text if this is an `N` value.
    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    /// Short type tag used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Bool(_) => "BOOL",
            Self::Null => "NULL",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::S(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::S(s)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// The non-key attributes of a row, ordered by name.
pub type Item = BTreeMap<String, AttributeValue>;

/// Composite primary key: a partition key plus a sort key within it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey {
    pub partition: String,
    pub sort: String,
}

impl RowKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {:?})", self.partition, self.sort)
    }
}

/// A stored row: primary key plus attributes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub key: RowKey,
    #[serde(default)]
    pub attributes: Item,
}

impl Row {
    /// A row that carries only its key (an adjacency marker).
    pub fn key_only(key: RowKey) -> Self {
        Self {
            key,
            attributes: Item::new(),
        }
    }

    pub fn new(key: RowKey, attributes: Item) -> Self {
        Self { key, attributes }
    }
}

/// One mutation inside a batch write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteRequest {
    /// Insert or fully replace the row at its key.
    Put(Row),
    /// Remove the row at this key. Deleting a missing row is not an error.
    Delete(RowKey),
}

impl WriteRequest {
    /// The primary key this request touches.
    pub fn key(&self) -> &RowKey {
        match self {
            Self::Put(row) => &row.key,
            Self::Delete(key) => key,
        }
    }

    pub fn is_put(&self) -> bool {
        matches!(self, Self::Put(_))
    }
}

/// Scalar type of a key attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    String,
    Number,
    Binary,
}

/// Name and type of one key attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    pub kind: KeyType,
}

impl KeyAttribute {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: KeyType::String,
        }
    }
}

/// Key schema of a table: one partition (hash) key and one sort (range) key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub partition_key: KeyAttribute,
    pub sort_key: KeyAttribute,
}

impl Default for TableSchema {
    /// String partition key `Key` and string sort key `Child`.
    fn default() -> Self {
        Self {
            partition_key: KeyAttribute::string("Key"),
            sort_key: KeyAttribute::string("Child"),
        }
    }
}

/// A request for one page of a partition scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryRequest {
    /// Partition to scan.
    pub partition: String,
    /// Resume strictly after this sort key (from a previous page).
    pub exclusive_start: Option<String>,
    /// Page size limit; the backend may return fewer rows.
    pub limit: Option<usize>,
}

impl QueryRequest {
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            ..Default::default()
        }
    }
}

/// One page of query results.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    /// Rows in ascending sort-key order.
    pub rows: Vec<Row>,
    /// Sort key to resume from, or `None` when the partition is exhausted.
    pub last_evaluated_key: Option<String>,
}
