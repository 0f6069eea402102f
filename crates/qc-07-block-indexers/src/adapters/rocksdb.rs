//! # RocksDB Index Store
//!
//! Production implementation of [`IndexDatabase`] on an
//! `OptimisticTransactionDB`.
//!
//! ## Key Layout
//!
//! Buckets are key prefixes inside the default column family:
//!
//! - `0x00 "bucket" 0x00 <name>` -> empty marker (bucket registry)
//! - `<name> 0x00 <key>` -> value
//!
//! Bucket names must not contain NUL bytes.
//!
//! ## Transactions
//!
//! - `view` reads from a RocksDB snapshot
//! - `update` runs inside an optimistic transaction, committed on success
//!   and rolled back on error; writers are serialized by a mutex so commits
//!   never conflict

use parking_lot::Mutex;
use rocksdb::{
    Direction, IteratorMode, OptimisticTransactionDB, Options, SnapshotWithThreadMode,
    Transaction,
};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{IndexError, StorageError};
use crate::ports::{IndexDatabase, StorageTx};

const BUCKET_REGISTRY_PREFIX: &[u8] = b"\x00bucket\x00";

/// RocksDB-backed index database
pub struct RocksDbIndexStore {
    db: OptimisticTransactionDB,
    writer: Mutex<()>,
}

impl RocksDbIndexStore {
    /// Open or create a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let db = OptimisticTransactionDB::open(&opts, path.as_ref()).map_err(|e| {
            StorageError::Backend {
                message: format!("Failed to open RocksDB: {}", e),
            }
        })?;

        info!("[qc-07] Opened index store at {}", path.as_ref().display());

        Ok(Self {
            db,
            writer: Mutex::new(()),
        })
    }
}

impl IndexDatabase for RocksDbIndexStore {
    fn view<T, F>(&self, f: F) -> Result<T, IndexError>
    where
        F: FnOnce(&dyn StorageTx) -> Result<T, IndexError>,
    {
        let tx = SnapshotTx {
            snapshot: self.db.snapshot(),
        };
        f(&tx)
    }

    fn update<T, F>(&self, f: F) -> Result<T, IndexError>
    where
        F: FnOnce(&mut dyn StorageTx) -> Result<T, IndexError>,
    {
        let _writer = self.writer.lock();
        let mut tx = WriteTx {
            txn: self.db.transaction(),
        };

        match f(&mut tx) {
            Ok(value) => {
                tx.txn.commit().map_err(backend)?;
                Ok(value)
            }
            Err(err) => {
                tx.txn.rollback().map_err(backend)?;
                debug!(error = %err, "[qc-07] RocksDB transaction rolled back");
                Err(err)
            }
        }
    }
}

fn backend(err: rocksdb::Error) -> StorageError {
    StorageError::Backend {
        message: err.to_string(),
    }
}

fn registry_key(bucket: &str) -> Vec<u8> {
    let mut key = BUCKET_REGISTRY_PREFIX.to_vec();
    key.extend_from_slice(bucket.as_bytes());
    key
}

fn entry_prefix(bucket: &str) -> Vec<u8> {
    let mut prefix = bucket.as_bytes().to_vec();
    prefix.push(0);
    prefix
}

fn entry_key(bucket: &str, key: &[u8]) -> Vec<u8> {
    let mut full = entry_prefix(bucket);
    full.extend_from_slice(key);
    full
}

fn not_found(bucket: &str) -> StorageError {
    StorageError::BucketNotFound {
        bucket: bucket.to_string(),
    }
}

struct SnapshotTx<'a> {
    snapshot: SnapshotWithThreadMode<'a, OptimisticTransactionDB>,
}

impl StorageTx for SnapshotTx<'_> {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self
            .snapshot
            .get(registry_key(bucket))
            .map_err(backend)?
            .is_some())
    }

    fn create_bucket(&mut self, _: &str) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly)
    }

    fn delete_bucket(&mut self, _: &str) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly)
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if !self.bucket_exists(bucket)? {
            return Err(not_found(bucket));
        }
        self.snapshot.get(entry_key(bucket, key)).map_err(backend)
    }

    fn put(&mut self, _: &str, _: &[u8], _: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly)
    }

    fn delete(&mut self, _: &str, _: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly)
    }
}

struct WriteTx<'a> {
    txn: Transaction<'a, OptimisticTransactionDB>,
}

impl WriteTx<'_> {
    fn require_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        if self.bucket_exists(bucket)? {
            Ok(())
        } else {
            Err(not_found(bucket))
        }
    }
}

impl StorageTx for WriteTx<'_> {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.txn.get(registry_key(bucket)).map_err(backend)?.is_some())
    }

    fn create_bucket(&mut self, bucket: &str) -> Result<(), StorageError> {
        if self.bucket_exists(bucket)? {
            return Err(StorageError::BucketExists {
                bucket: bucket.to_string(),
            });
        }
        self.txn.put(registry_key(bucket), b"").map_err(backend)
    }

    fn delete_bucket(&mut self, bucket: &str) -> Result<(), StorageError> {
        self.require_bucket(bucket)?;

        let prefix = entry_prefix(bucket);
        let mut keys = Vec::new();
        for item in self
            .txn
            .iterator(IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(backend)?;
            if !key.starts_with(&prefix) {
                break;
            }
            keys.push(key);
        }

        for key in keys {
            self.txn.delete(&key).map_err(backend)?;
        }
        self.txn.delete(registry_key(bucket)).map_err(backend)
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.require_bucket(bucket)?;
        self.txn.get(entry_key(bucket, key)).map_err(backend)
    }

    fn put(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.require_bucket(bucket)?;
        self.txn.put(entry_key(bucket, key), value).map_err(backend)
    }

    fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<(), StorageError> {
        self.require_bucket(bucket)?;
        self.txn.delete(entry_key(bucket, key)).map_err(backend)
    }
}
