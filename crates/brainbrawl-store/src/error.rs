use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database could not be opened, e.g. because another process kept
    /// it locked for longer than the retry budget.
    #[error("Could not open database: {0}")]
    Connection(String),

    /// No record with that id exists in the collection.
    #[error("No {collection} record with id {id}")]
    NotFound { collection: &'static str, id: i64 },

    /// The write would break an invariant and was rejected.
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// SQLite error; the operation was not applied.
    #[error("Database error: {0}")]
    Storage(#[source] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure. Fatal: the store never runs on a partial schema.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A JSON column could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection mutex was poisoned by a panicking operation.
    #[error("Store lock poisoned")]
    Poisoned,

    /// The blocking task running an operation panicked or was cancelled.
    #[error("Store task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(msg.clone().unwrap_or_else(|| code.to_string()))
            }
            _ => StoreError::Storage(err),
        }
    }
}

impl StoreError {
    pub(crate) fn not_found(collection: &'static str, id: impl Into<i64>) -> Self {
        StoreError::NotFound {
            collection,
            id: id.into(),
        }
    }

    /// Map `QueryReturnedNoRows` to [`StoreError::NotFound`].
    pub(crate) fn lookup(collection: &'static str, id: i64) -> impl FnOnce(rusqlite::Error) -> Self {
        move |e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::not_found(collection, id),
            other => StoreError::from(other),
        }
    }

    /// Whether the failure was another connection holding the lock.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StoreError::Storage(rusqlite::Error::SqliteFailure(code, _))
                if matches!(code.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
