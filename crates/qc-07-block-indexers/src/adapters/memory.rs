//! In-memory index database
//!
//! Snapshot-isolated transactional store for tests and development nodes.
//!
//! ## Isolation Model
//!
//! - Committed state is an `Arc<Buckets>`
//! - `view` clones the `Arc` and reads that snapshot without blocking writers
//! - `update` serializes writers and records its changes in an overlay on
//!   top of the committed snapshot; nothing is copied up front
//! - On success the overlay is applied in place with `Arc::make_mut`, which
//!   only clones the committed map while a reader still holds the old
//!   snapshot. A failed update simply discards the overlay.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{IndexError, StorageError};
use crate::ports::{IndexDatabase, StorageTx};

type Bucket = BTreeMap<Vec<u8>, Vec<u8>>;
type Buckets = BTreeMap<String, Bucket>;

/// In-memory implementation of [`IndexDatabase`].
#[derive(Default)]
pub struct InMemoryIndexDb {
    committed: RwLock<Arc<Buckets>>,
    writer: Mutex<()>,
}

impl InMemoryIndexDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a committed bucket's contents, or `None` if it doesn't exist.
    pub fn bucket_contents(&self, bucket: &str) -> Option<BTreeMap<Vec<u8>, Vec<u8>>> {
        self.committed.read().get(bucket).cloned()
    }

    /// Names of all committed buckets.
    pub fn bucket_names(&self) -> Vec<String> {
        self.committed.read().keys().cloned().collect()
    }
}

impl IndexDatabase for InMemoryIndexDb {
    fn view<T, F>(&self, f: F) -> Result<T, IndexError>
    where
        F: FnOnce(&dyn StorageTx) -> Result<T, IndexError>,
    {
        let snapshot = self.committed.read().clone();
        let tx = SnapshotTx {
            buckets: &snapshot,
        };
        f(&tx)
    }

    fn update<T, F>(&self, f: F) -> Result<T, IndexError>
    where
        F: FnOnce(&mut dyn StorageTx) -> Result<T, IndexError>,
    {
        let _writer = self.writer.lock();

        let mut tx = WriteTx {
            base: self.committed.read().clone(),
            pending: BTreeMap::new(),
        };

        match f(&mut tx) {
            Ok(value) => {
                let WriteTx { base, pending } = tx;
                // Release our reference so `make_mut` can apply in place.
                drop(base);

                let mut committed = self.committed.write();
                let state = Arc::make_mut(&mut *committed);
                for (name, change) in pending {
                    change.apply(state, name);
                }
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "[qc-07] In-memory transaction rolled back");
                Err(err)
            }
        }
    }
}

/// Read-only view over a committed snapshot.
struct SnapshotTx<'a> {
    buckets: &'a Buckets,
}

impl StorageTx for SnapshotTx<'_> {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.contains_key(bucket))
    }

    fn create_bucket(&mut self, _: &str) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly)
    }

    fn delete_bucket(&mut self, _: &str) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly)
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(lookup(self.buckets, bucket)?.get(key).cloned())
    }

    fn put(&mut self, _: &str, _: &[u8], _: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly)
    }

    fn delete(&mut self, _: &str, _: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly)
    }
}

/// Uncommitted change to one bucket.
enum PendingBucket {
    /// Bucket removed.
    Dropped,
    /// Bucket (re)created in this transaction; committed contents ignored.
    Fresh(Bucket),
    /// Per-key edits on a committed bucket; `None` deletes the key.
    Edits(BTreeMap<Vec<u8>, Option<Vec<u8>>>),
}

impl PendingBucket {
    fn apply(self, state: &mut Buckets, name: String) {
        match self {
            PendingBucket::Dropped => {
                state.remove(&name);
            }
            PendingBucket::Fresh(bucket) => {
                state.insert(name, bucket);
            }
            PendingBucket::Edits(edits) => {
                let bucket = state.entry(name).or_default();
                for (key, value) in edits {
                    match value {
                        Some(value) => bucket.insert(key, value),
                        None => bucket.remove(&key),
                    };
                }
            }
        }
    }
}

/// Write transaction: committed snapshot plus an overlay of changes.
struct WriteTx {
    base: Arc<Buckets>,
    pending: BTreeMap<String, PendingBucket>,
}

impl WriteTx {
    /// Record `value` (or a deletion) for `key` in an existing bucket.
    fn stage(
        &mut self,
        bucket: &str,
        key: &[u8],
        value: Option<Vec<u8>>,
    ) -> Result<(), StorageError> {
        if !self.pending.contains_key(bucket) {
            if !self.base.contains_key(bucket) {
                return Err(not_found(bucket));
            }
            self.pending
                .insert(bucket.to_string(), PendingBucket::Edits(BTreeMap::new()));
        }

        match self.pending.get_mut(bucket) {
            Some(PendingBucket::Fresh(contents)) => {
                match value {
                    Some(value) => contents.insert(key.to_vec(), value),
                    None => contents.remove(key),
                };
                Ok(())
            }
            Some(PendingBucket::Edits(edits)) => {
                edits.insert(key.to_vec(), value);
                Ok(())
            }
            Some(PendingBucket::Dropped) | None => Err(not_found(bucket)),
        }
    }
}

impl StorageTx for WriteTx {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(match self.pending.get(bucket) {
            Some(PendingBucket::Dropped) => false,
            Some(_) => true,
            None => self.base.contains_key(bucket),
        })
    }

    fn create_bucket(&mut self, bucket: &str) -> Result<(), StorageError> {
        if self.bucket_exists(bucket)? {
            return Err(StorageError::BucketExists {
                bucket: bucket.to_string(),
            });
        }
        self.pending
            .insert(bucket.to_string(), PendingBucket::Fresh(Bucket::new()));
        Ok(())
    }

    fn delete_bucket(&mut self, bucket: &str) -> Result<(), StorageError> {
        if !self.bucket_exists(bucket)? {
            return Err(not_found(bucket));
        }
        if self.base.contains_key(bucket) {
            self.pending
                .insert(bucket.to_string(), PendingBucket::Dropped);
        } else {
            self.pending.remove(bucket);
        }
        Ok(())
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        match self.pending.get(bucket) {
            Some(PendingBucket::Dropped) => Err(not_found(bucket)),
            Some(PendingBucket::Fresh(contents)) => Ok(contents.get(key).cloned()),
            Some(PendingBucket::Edits(edits)) => match edits.get(key) {
                Some(value) => Ok(value.clone()),
                None => Ok(lookup(&self.base, bucket)?.get(key).cloned()),
            },
            None => Ok(lookup(&self.base, bucket)?.get(key).cloned()),
        }
    }

    fn put(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.stage(bucket, key, Some(value.to_vec()))
    }

    fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<(), StorageError> {
        self.stage(bucket, key, None)
    }
}

fn not_found(bucket: &str) -> StorageError {
    StorageError::BucketNotFound {
        bucket: bucket.to_string(),
    }
}

fn lookup<'a>(buckets: &'a Buckets, bucket: &str) -> Result<&'a Bucket, StorageError> {
    buckets.get(bucket).ok_or_else(|| not_found(bucket))
}
