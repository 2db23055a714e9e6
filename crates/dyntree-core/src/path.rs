//! Path codec: translating ordered paths into table rows.
//!
//! A path `["Accounts", "123456", "Links", "xyzpdq"]` with the default
//! delimiter `¦` is stored as one edge row per prefix level plus one object
//! row:
//!
//! ```text
//! partition                    sort
//! ¦                            Accounts        edge
//! ¦Accounts¦                   123456          edge
//! ¦Accounts¦123456¦            Links           edge
//! ¦Accounts¦123456¦Links¦      xyzpdq          edge
//! ¦Accounts¦123456¦Links¦xyzpdq ¦              object (payload attributes)
//! ```
//!
//! A directory partition always ends with the delimiter, an object
//! partition never does, so `¦Accounts¦123456` (one object) and
//! `¦Accounts¦123456¦` (its children) coexist without colliding. The root
//! directory is the bare delimiter.
//!
//! A link row is an object row whose only attribute is named by the
//! delimiter itself and holds the encoded target path.

use dyntree_store::{AttributeValue, Item, Row, RowKey, WriteRequest};

use crate::error::{Result, TreeError};

/// Encodes paths with one reserved delimiter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathCodec {
    delimiter: String,
}

impl PathCodec {
    /// `delimiter` must be a single character. A longer delimiter can
    /// overlap itself and map two distinct paths onto the same key;
    /// [`TreeConfig::validated`](crate::TreeConfig::validated) rejects it.
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    /// The reserved delimiter.
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Name of the reserved attribute that marks a link row.
    pub fn link_attribute(&self) -> &str {
        &self.delimiter
    }

    // ---- Validation ----

    /// A component must be non-empty and free of the delimiter.
    pub fn validate_component(&self, component: &str) -> Result<()> {
        if component.is_empty() {
            return Err(TreeError::EmptyComponent);
        }
        if component.contains(self.delimiter.as_str()) {
            return Err(TreeError::ReservedCharacterInKey {
                component: component.to_string(),
            });
        }
        Ok(())
    }

    /// Validate a directory prefix. The empty prefix names the root.
    pub fn validate_prefix<S: AsRef<str>>(&self, prefix: &[S]) -> Result<()> {
        prefix
            .iter()
            .try_for_each(|c| self.validate_component(c.as_ref()))
    }

    /// Validate a full object path, which needs at least one component.
    pub fn validate_path<S: AsRef<str>>(&self, path: &[S]) -> Result<()> {
        if path.is_empty() {
            return Err(TreeError::EmptyPath);
        }
        self.validate_prefix(path)
    }

    /// No application attribute may start with the delimiter.
    pub fn validate_attributes(&self, item: &Item) -> Result<()> {
        match item.keys().find(|name| name.starts_with(self.delimiter.as_str())) {
            Some(name) => Err(TreeError::ReservedCharacterInAttribute { name: name.clone() }),
            None => Ok(()),
        }
    }

    // ---- Keys ----

    /// Partition key listing the children of `prefix`.
    pub fn directory_partition<S: AsRef<str>>(&self, prefix: &[S]) -> String {
        let mut key = self.object_partition(prefix);
        if !prefix.is_empty() {
            key.push_str(&self.delimiter);
        }
        key
    }

    /// Partition key of the object row at `path` (also the encoded form
    /// of `path` when used as a link target).
    pub fn object_partition<S: AsRef<str>>(&self, path: &[S]) -> String {
        let mut key = String::with_capacity(
            path.iter()
                .map(|c| c.as_ref().len() + self.delimiter.len())
                .sum::<usize>()
                .max(self.delimiter.len()),
        );
        key.push_str(&self.delimiter);
        for (i, component) in path.iter().enumerate() {
            if i > 0 {
                key.push_str(&self.delimiter);
            }
            key.push_str(component.as_ref());
        }
        key
    }

    /// Key of the object (or link) row at `path`.
    pub fn object_key<S: AsRef<str>>(&self, path: &[S]) -> RowKey {
        RowKey::new(self.object_partition(path), self.delimiter.clone())
    }

    /// Key of the edge row joining `path`'s parent to its last component.
    ///
    /// `path` must be non-empty.
    pub fn edge_key<S: AsRef<str>>(&self, path: &[S]) -> RowKey {
        let (leaf, parent) = path
            .split_last()
            .map(|(leaf, parent)| (leaf.as_ref(), parent))
            .unwrap_or(("", &[]));
        RowKey::new(self.directory_partition(parent), leaf)
    }

    /// One edge row per prefix level of `path`, root first.
    pub fn edge_rows<S: AsRef<str>>(&self, path: &[S]) -> Vec<Row> {
        let mut rows = Vec::with_capacity(path.len());
        let mut partition = self.delimiter.clone();
        for (i, component) in path.iter().enumerate() {
            if i > 0 {
                partition.push_str(&self.delimiter);
            }
            rows.push(Row::key_only(RowKey::new(
                partition.clone(),
                component.as_ref(),
            )));
            partition.push_str(component.as_ref());
        }
        rows
    }

    // ---- Link targets ----

    /// Encode a target path for storage in a link row.
    pub fn encode_target<S: AsRef<str>>(&self, target: &[S]) -> String {
        self.object_partition(target)
    }

    /// Decode a stored target. Returns `None` if it is not delimiter-prefixed.
    pub fn decode_target(&self, encoded: &str) -> Option<Vec<String>> {
        let rest = encoded.strip_prefix(self.delimiter.as_str())?;
        Some(rest.split(self.delimiter.as_str()).map(str::to_string).collect())
    }

    /// The target held by a row's link attribute, if it carries one.
    ///
    /// `Some(None)` means the attribute exists but does not hold a valid path.
    pub fn link_target_of(&self, row: &Row) -> Option<Option<Vec<String>>> {
        row.attributes
            .get(self.link_attribute())
            .map(|value| value.as_s().and_then(|s| self.decode_target(s)))
    }

    // ---- Row sets ----

    /// Every write needed to store `item` at `path`: edges, then the object row.
    pub fn object_requests<S: AsRef<str>>(&self, path: &[S], item: Item) -> Result<Vec<WriteRequest>> {
        self.validate_path(path)?;
        self.validate_attributes(&item)?;
        let mut requests: Vec<WriteRequest> = self
            .edge_rows(path)
            .into_iter()
            .map(WriteRequest::Put)
            .collect();
        requests.push(WriteRequest::Put(Row::new(self.object_key(path), item)));
        Ok(requests)
    }

    /// Every write needed to link `path` to `target`.
    pub fn link_requests<S: AsRef<str>, T: AsRef<str>>(
        &self,
        path: &[S],
        target: &[T],
    ) -> Result<Vec<WriteRequest>> {
        self.validate_path(path)?;
        self.validate_path(target)?;
        let mut attributes = Item::new();
        attributes.insert(
            self.link_attribute().to_string(),
            AttributeValue::S(self.encode_target(target)),
        );
        let mut requests: Vec<WriteRequest> = self
            .edge_rows(path)
            .into_iter()
            .map(WriteRequest::Put)
            .collect();
        requests.push(WriteRequest::Put(Row::new(self.object_key(path), attributes)));
        Ok(requests)
    }

    /// The two deletes that remove `path`: its parent edge and its object row.
    pub fn delete_requests<S: AsRef<str>>(&self, path: &[S]) -> Result<Vec<WriteRequest>> {
        self.validate_path(path)?;
        Ok(vec![
            WriteRequest::Delete(self.edge_key(path)),
            WriteRequest::Delete(self.object_key(path)),
        ])
    }

    /// Human-readable form used in errors and logs (`/a/b`).
    pub fn display<S: AsRef<str>>(path: &[S]) -> String {
        if path.is_empty() {
            return "/".to_string();
        }
        path.iter().fold(String::new(), |mut out, c| {
            out.push('/');
            out.push_str(c.as_ref());
            out
        })
    }
}

impl Default for PathCodec {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_DELIMITER)
    }
}
