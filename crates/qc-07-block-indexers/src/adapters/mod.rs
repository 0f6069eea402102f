//! Adapters Layer (Driven Adapters)
//!
//! Storage engines implementing the `IndexDatabase` port.
//!
//! ## Adapters
//!
//! - `InMemoryIndexDb` - Snapshot-isolated in-memory store (tests, dev)
//! - `RocksDbIndexStore` - Optimistic-transaction RocksDB store (feature `rocksdb`)

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;

pub use memory::InMemoryIndexDb;
#[cfg(feature = "rocksdb")]
pub use self::rocksdb::RocksDbIndexStore;
