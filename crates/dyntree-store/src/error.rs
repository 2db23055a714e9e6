/// Errors from table store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The named table has not been created.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A table with this name already exists.
    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    /// A batch write carried more requests than the backend accepts.
    #[error("batch too large: at most {max} requests allowed, got {actual}")]
    BatchTooLarge { max: usize, actual: usize },

    /// The same primary key appeared twice in one batch write.
    #[error("duplicate key in batch: partition={partition:?} sort={sort:?}")]
    DuplicateKeyInBatch { partition: String, sort: String },

    /// Opaque failure reported by the backend (network, throttling, schema).
    #[error("backend error: {0}")]
    Backend(String),

    /// An internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
