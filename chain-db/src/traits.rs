//! Database traits and interfaces

use crate::{ColumnFamily, DbResult};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// Key-value database trait
pub trait KeyValueDB: Send + Sync {
    /// Get value by key from a column family
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<Option<Vec<u8>>>;

    /// Put key-value pair into a column family
    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> DbResult<()>;

    /// Delete key from a column family
    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<()>;

    /// Check if key exists in a column family
    fn exists(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<bool> {
        Ok(self.get(cf, key)?.is_some())
    }

    /// Flush buffered writes to durable storage
    fn flush(&self) -> DbResult<()>;
}

/// Shared database reference
pub type SharedDatabase = Arc<dyn KeyValueDB>;

/// JSON helpers over any [`KeyValueDB`]
pub trait JsonStore {
    /// Read and decode a JSON value
    fn get_json<T: DeserializeOwned>(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<Option<T>>;

    /// Encode and write a JSON value
    fn put_json<T: Serialize>(&self, cf: ColumnFamily, key: &[u8], value: &T) -> DbResult<()>;
}

impl<D: KeyValueDB + ?Sized> JsonStore for D {
    fn get_json<T: DeserializeOwned>(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<Option<T>> {
        match self.get(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf: ColumnFamily, key: &[u8], value: &T) -> DbResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(cf, key, &bytes)
    }
}
