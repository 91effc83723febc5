//! RocksDB key-value backend

use crate::{ColumnFamily, DbError, DbResult, KeyValueDB};
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::path::Path;
use tracing::info;

/// Persistent database with one RocksDB column family per [`ColumnFamily`]
pub struct RocksDatabase {
    db: DB,
}

impl RocksDatabase {
    /// Open (or create) a database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = ColumnFamily::all()
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(cf.name(), Options::default()));

        let db = DB::open_cf_descriptors(&opts, path.as_ref(), descriptors)?;
        info!("Opened consensus database at {}", path.as_ref().display());
        Ok(Self { db })
    }

    fn handle(&self, cf: ColumnFamily) -> DbResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(cf.name())
            .ok_or_else(|| DbError::UnknownColumnFamily(cf.name().to_string()))
    }
}

impl KeyValueDB for RocksDatabase {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.db.get_cf(self.handle(cf)?, key)?)
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> DbResult<()> {
        Ok(self.db.put_cf(self.handle(cf)?, key, value)?)
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<()> {
        Ok(self.db.delete_cf(self.handle(cf)?, key)?)
    }

    fn flush(&self) -> DbResult<()> {
        Ok(self.db.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let db = RocksDatabase::open(dir.path()).unwrap();
            db.put(ColumnFamily::Snapshots, b"pbft-key", b"value").unwrap();
            db.flush().unwrap();
        }

        let db = RocksDatabase::open(dir.path()).unwrap();
        assert_eq!(
            db.get(ColumnFamily::Snapshots, b"pbft-key").unwrap(),
            Some(b"value".to_vec())
        );
        assert!(db.get(ColumnFamily::Default, b"pbft-key").unwrap().is_none());
    }
}
