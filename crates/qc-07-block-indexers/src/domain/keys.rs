//! Bucket names and record encodings
//!
//! ## Persisted Layout
//!
//! | Bucket        | Key                | Value                        |
//! |---------------|--------------------|------------------------------|
//! | `cfbyhashidx` | block hash (32 B)  | serialized GCS filter        |
//! | `idxtips`     | index key (UTF-8)  | bincode `IndexTip`           |

use crate::domain::entities::{BlockHash, IndexTip};
use crate::error::IndexError;

/// Bucket holding block hash -> committed filter.
pub const CF_INDEX_KEY: &str = "cfbyhashidx";

/// Human-readable name of the committed filter index.
pub const CF_INDEX_NAME: &str = "committed filter index";

/// Bucket holding each index's tip; an index's record here is its
/// registration.
pub const INDEX_TIPS_BUCKET: &str = "idxtips";

/// Key for a filter entry.
pub fn filter_entry_key(hash: &BlockHash) -> &[u8] {
    hash.as_ref()
}

/// Key for an index tip record.
pub fn tip_key(index_key: &str) -> &[u8] {
    index_key.as_bytes()
}

pub fn encode_tip(tip: &IndexTip) -> Result<Vec<u8>, IndexError> {
    Ok(bincode::serialize(tip)?)
}

pub fn decode_tip(bytes: &[u8]) -> Result<IndexTip, IndexError> {
    Ok(bincode::deserialize(bytes)?)
}
