//! Error types for the block indexer subsystem

use thiserror::Error;

use crate::domain::BlockHash;

/// Errors raised by the storage engine inside a transaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Bucket already exists: {bucket}")]
    BucketExists { bucket: String },

    #[error("Bucket not found: {bucket}")]
    BucketNotFound { bucket: String },

    #[error("Write attempted on a read-only transaction")]
    ReadOnly,

    #[error("Storage backend error: {message}")]
    Backend { message: String },

    #[error("Storage corruption: {message}")]
    Corruption { message: String },
}

/// Errors from Golomb-coded set construction and decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcsError {
    #[error("Invalid false-positive parameter P={p} (must be 1..=32)")]
    InvalidP { p: u8 },

    #[error("Too many elements for a single filter: {count}")]
    TooManyElements { count: usize },

    #[error("Serialized filter truncated: {len} bytes")]
    Truncated { len: usize },
}

/// Errors deriving per-block data from a connected block
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockDataError {
    #[error("Malformed transaction at index {index}")]
    MalformedTransaction { index: usize },

    #[error("Transaction index {index} out of range (block has {count})")]
    IndexOutOfRange { index: usize, count: usize },
}

/// Errors surfaced by indexers and the index manager
///
/// Any error returned from a connect/disconnect hook must abort the
/// caller's transaction.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Filter construction error: {0}")]
    Filter(#[from] GcsError),

    #[error("Block data error: {0}")]
    BlockData(#[from] BlockDataError),

    #[error("Failed to initialize {name}: {reason}")]
    InitFailed { name: String, reason: String },

    #[error("Can't remove non-existent filter {block_hash} from the cfilter index")]
    MissingFilterEntry { block_hash: BlockHash },

    #[error("Index {index} tip mismatch: expected {expected}, found {found}")]
    TipMismatch {
        index: String,
        expected: BlockHash,
        found: BlockHash,
    },

    #[error("Index {index} is not active (state: {state})")]
    NotActive { index: String, state: String },

    #[error("Unknown index: {key}")]
    UnknownIndex { key: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        IndexError::Serialization {
            message: err.to_string(),
        }
    }
}
