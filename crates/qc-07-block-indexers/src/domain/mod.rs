//! Domain Layer - Pure business logic
//!
//! This layer contains:
//! - GCS filter construction and matching
//! - Filter index configuration
//! - Chain entities seen by indexers
//! - Bucket names and record encodings
//!
//! RULES:
//! - No I/O operations
//! - No async code

pub mod config;
pub mod entities;
pub mod gcs_filter;
pub mod keys;

pub use config::{default_filter_key, FilterIndexConfig, FilterIndexConfigBuilder};
pub use entities::{
    Block, BlockHash, BlockTransaction, IndexTip, OutPoint, TxHash, UtxoEntry, UtxoViewpoint,
};
pub use gcs_filter::{build_block_filter, GcsFilter, DEFAULT_P, KEY_SIZE, MAX_P};
pub use keys::{CF_INDEX_KEY, CF_INDEX_NAME, INDEX_TIPS_BUCKET};
