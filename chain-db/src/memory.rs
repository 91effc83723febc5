//! In-memory key-value backend

use crate::{ColumnFamily, DbResult, KeyValueDB};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Volatile database, used by tests and ephemeral nodes
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    columns: RwLock<HashMap<(ColumnFamily, Vec<u8>), Vec<u8>>>,
}

impl MemoryDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys in a column family
    pub fn len(&self, cf: ColumnFamily) -> usize {
        self.columns.read().keys().filter(|(c, _)| *c == cf).count()
    }

    /// Whether a column family holds no keys
    pub fn is_empty(&self, cf: ColumnFamily) -> bool {
        self.len(cf) == 0
    }
}

impl KeyValueDB for MemoryDatabase {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.columns.read().get(&(cf, key.to_vec())).cloned())
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> DbResult<()> {
        self.columns
            .write()
            .insert((cf, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<()> {
        self.columns.write().remove(&(cf, key.to_vec()));
        Ok(())
    }

    fn flush(&self) -> DbResult<()> {
        Ok(())
    }
}
