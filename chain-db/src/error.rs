//! Database error types

use thiserror::Error;

/// Database error type
#[derive(Error, Debug)]
pub enum DbError {
    /// RocksDB error
    #[cfg(feature = "rocksdb-backend")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unknown column family
    #[error("Unknown column family: {0}")]
    UnknownColumnFamily(String),
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
