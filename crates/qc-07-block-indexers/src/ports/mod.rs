//! Ports Layer
//!
//! Defines the interfaces (traits) for:
//! - Driving Ports (inbound) - indexer contract and filter lookup
//! - Driven Ports (outbound) - storage engine and chain-state machine

pub mod inbound;
pub mod outbound;

pub use inbound::{FilterLookup, Indexer};
pub use outbound::{ChainBlock, IndexDatabase, StorageTx};
