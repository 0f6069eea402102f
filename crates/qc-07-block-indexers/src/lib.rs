//! # QC-07 Block Indexers
//!
//! Optional per-block indexes maintained alongside the chain, starting with
//! the committed filter index: a compact Golomb-coded set (GCS) of each
//! block's transaction hashes, stored by block hash for light clients.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure business logic, no I/O
//!   - `GcsFilter`: Golomb-Rice coded set construction and matching
//!   - `FilterIndexConfig`: False-positive parameter and SipHash key
//!   - `Block`, `IndexTip`: Chain entities seen by indexers
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `Indexer`: Driving port every index implements
//!   - `FilterLookup`: Read API for filter-serving front ends
//!   - `IndexDatabase` / `StorageTx`: Driven port for the transactional
//!     bucket store
//!   - `ChainBlock`: Driven port for block data
//!
//! - **Service Layer** (`service/`): Orchestration
//!   - `IndexManager`: Init, provisioning, tip tracking, event fan-out
//!   - `FilterIndex`: Committed filter index
//!
//! - **Adapters Layer** (`adapters/`): Storage engines
//!   - `InMemoryIndexDb`: Snapshot-isolated in-memory store
//!   - `RocksDbIndexStore`: RocksDB store (feature `rocksdb`)
//!
//! ## Invariants
//!
//! - **Atomicity**: index writes for a block commit or roll back with the
//!   transaction that connects or disconnects it
//! - **Consistency**: after any sequence of connects and disconnects, the
//!   filter bucket holds exactly one entry per block on the active chain
//! - **No false negatives**: every transaction hash of a block matches its
//!   filter
//! - **Presence**: an indexed block with no transactions still has a
//!   filter; a missing entry only ever means "not indexed"
//!
//! ## Usage Example
//!
//! ```ignore
//! use qc_07_block_indexers::{
//!     FilterIndex, FilterIndexConfig, FilterLookup, InMemoryIndexDb, IndexDatabase,
//!     IndexManager, UtxoViewpoint,
//! };
//! use std::sync::Arc;
//!
//! let db = Arc::new(InMemoryIndexDb::new());
//! let index = Arc::new(FilterIndex::new(db.clone(), FilterIndexConfig::default()));
//! let mut manager = IndexManager::new(db.clone(), vec![Box::new(index.clone())]);
//! manager.init()?;
//!
//! // Inside the chain's own transaction:
//! db.update(|tx| manager.connect_block(tx, &block, &UtxoViewpoint::new()))?;
//!
//! // The same instance serves light-client lookups.
//! let filter = index.filter_by_block_hash(&block.hash)?;
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-exports for convenience
pub use adapters::InMemoryIndexDb;
#[cfg(feature = "rocksdb")]
pub use adapters::RocksDbIndexStore;
pub use domain::{
    build_block_filter, default_filter_key, Block, BlockHash, BlockTransaction,
    FilterIndexConfig, FilterIndexConfigBuilder, GcsFilter, IndexTip, OutPoint, TxHash,
    UtxoEntry, UtxoViewpoint, CF_INDEX_KEY, CF_INDEX_NAME, DEFAULT_P, INDEX_TIPS_BUCKET,
    KEY_SIZE, MAX_P,
};
pub use error::{BlockDataError, GcsError, IndexError, StorageError};
pub use metrics::{IndexMetrics, IndexMetricsSnapshot, IndexObserver, NoOpObserver};
pub use ports::{ChainBlock, FilterLookup, IndexDatabase, Indexer, StorageTx};
pub use service::{drop_index, BlockEvent, FilterIndex, IndexManager, IndexerState};
