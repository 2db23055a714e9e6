//! Error types for tree operations.

use thiserror::Error;

use dyntree_store::StoreError;

use crate::codec::CodecError;

/// Errors that can occur during tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// No object row exists at the requested path.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// The row exists but is an ordinary object, not a link.
    #[error("not a link: {path}")]
    NotLink { path: String },

    /// A path component contains the reserved delimiter.
    #[error("a key part contains the reserved character: {component:?}")]
    ReservedCharacterInKey { component: String },

    /// An attribute name starts with the reserved delimiter.
    #[error("an attribute name starts with the reserved character: {name:?}")]
    ReservedCharacterInAttribute { name: String },

    /// The operation needs at least one path component.
    #[error("path must have at least one component")]
    EmptyPath,

    /// A path component is the empty string.
    #[error("path components must not be empty")]
    EmptyComponent,

    /// Following links exceeded the configured hop limit (usually a cycle).
    #[error("too many link redirects resolving {path} (limit {max_hops})")]
    TooManyRedirects { path: String, max_hops: usize },

    /// The reserved link attribute is present but does not hold a path.
    #[error("corrupt link at {path}")]
    CorruptLink { path: String },

    /// A batch still had unprocessed requests after the retry budget ran out.
    #[error("batch retries exhausted with {pending} requests unprocessed")]
    RetriesExhausted { pending: usize },

    /// The tree configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure from the backing table store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Failure converting a value to or from attributes.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TreeError {
    /// Returns `true` for [`TreeError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience type alias for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;
