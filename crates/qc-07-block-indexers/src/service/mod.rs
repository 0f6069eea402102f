//! Service Layer
//!
//! Contains the application services that drive indexers from chain events
//! and serve committed filters.
//!
//! - `IndexManager`: lifecycle, tip tracking and event fan-out
//! - `FilterIndex`: the committed filter index

pub mod filter_index;
pub mod manager;

pub use filter_index::FilterIndex;
pub use manager::{drop_index, BlockEvent, IndexManager, IndexerState};
