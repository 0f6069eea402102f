//! Outbound Ports (Driven Ports)
//!
//! Dependencies the indexers need from the host node:
//!
//! - `StorageTx` / `IndexDatabase`: the transactional key-value engine
//! - `ChainBlock`: block content supplied by the chain-state machine
//!
//! Production: `RocksDbIndexStore` (feature `rocksdb`)
//! Testing: `InMemoryIndexDb`

use crate::domain::{BlockHash, TxHash};
use crate::error::{BlockDataError, IndexError, StorageError};

/// Named-bucket access scoped to one atomic transaction.
///
/// Read transactions hand out `&dyn StorageTx`, so the mutating methods are
/// only reachable inside a write transaction. Commit and rollback belong to
/// whoever opened the transaction.
pub trait StorageTx {
    /// Check whether a bucket has been created.
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Create a bucket. Fails with `BucketExists` if it is already present.
    fn create_bucket(&mut self, bucket: &str) -> Result<(), StorageError>;

    /// Remove a bucket and every record in it.
    fn delete_bucket(&mut self, bucket: &str) -> Result<(), StorageError>;

    /// Get a value; `None` if the key is absent.
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Put a key-value pair.
    fn put(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Deleting an absent key is not an error.
    fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<(), StorageError>;
}

/// Transactional storage engine.
///
/// ## Isolation
///
/// A `view` observes either the state before or after any concurrent
/// `update`, never a partial one. `update` commits only when the closure
/// returns `Ok`; on `Err` every mutation made through the transaction is
/// discarded.
pub trait IndexDatabase: Send + Sync {
    /// Run `f` inside a short-lived read transaction.
    fn view<T, F>(&self, f: F) -> Result<T, IndexError>
    where
        F: FnOnce(&dyn StorageTx) -> Result<T, IndexError>;

    /// Run `f` inside a write transaction and commit on success.
    fn update<T, F>(&self, f: F) -> Result<T, IndexError>
    where
        F: FnOnce(&mut dyn StorageTx) -> Result<T, IndexError>;
}

/// Block content handed to indexers by the chain-state machine.
pub trait ChainBlock {
    fn hash(&self) -> BlockHash;

    fn parent_hash(&self) -> BlockHash;

    fn height(&self) -> u64;

    /// Number of transactions in the block.
    fn transaction_count(&self) -> usize;

    /// Identifier of the transaction at `index` (block order).
    fn tx_hash(&self, index: usize) -> Result<TxHash, BlockDataError>;
}
