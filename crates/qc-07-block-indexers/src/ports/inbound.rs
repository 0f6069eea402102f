//! Inbound Ports (Driving Ports)
//!
//! - `Indexer`: capability contract every index implements; driven by the
//!   `IndexManager` from inside the chain-state machine's transactions
//! - `FilterLookup`: read API for RPC front ends serving compact filters

use std::sync::Arc;

use crate::domain::{BlockHash, UtxoViewpoint};
use crate::error::IndexError;
use crate::ports::outbound::{ChainBlock, StorageTx};

/// An optional index maintained alongside the chain.
///
/// ## Lifecycle
///
/// ```text
/// Uninitialized --init--> Registered --create (once)--> Active
/// Active --connect_block / disconnect_block--> Active
/// Active --drop--> Removed
/// ```
///
/// Hooks are called strictly in chain order with the transaction that
/// commits the block; any error aborts that transaction.
pub trait Indexer: Send + Sync {
    /// One-time in-process setup. No persistence side effects.
    fn init(&self) -> Result<(), IndexError>;

    /// Stable storage namespace. Must never change once data exists under it.
    fn key(&self) -> &str;

    /// Human-readable label for diagnostics.
    fn name(&self) -> &str;

    /// Provision the index bucket the first time the index is enabled.
    fn create(&self, tx: &mut dyn StorageTx) -> Result<(), IndexError>;

    /// Derive and persist this index's data for a newly connected block.
    fn connect_block(
        &self,
        tx: &mut dyn StorageTx,
        block: &dyn ChainBlock,
        view: &UtxoViewpoint,
    ) -> Result<(), IndexError>;

    /// Remove exactly what `connect_block` added for this block.
    fn disconnect_block(
        &self,
        tx: &mut dyn StorageTx,
        block: &dyn ChainBlock,
        view: &UtxoViewpoint,
    ) -> Result<(), IndexError>;
}

/// Lets one shared index be registered with the manager and also serve
/// lookups.
impl<T: Indexer + ?Sized> Indexer for Arc<T> {
    fn init(&self) -> Result<(), IndexError> {
        (**self).init()
    }

    fn key(&self) -> &str {
        (**self).key()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn create(&self, tx: &mut dyn StorageTx) -> Result<(), IndexError> {
        (**self).create(tx)
    }

    fn connect_block(
        &self,
        tx: &mut dyn StorageTx,
        block: &dyn ChainBlock,
        view: &UtxoViewpoint,
    ) -> Result<(), IndexError> {
        (**self).connect_block(tx, block, view)
    }

    fn disconnect_block(
        &self,
        tx: &mut dyn StorageTx,
        block: &dyn ChainBlock,
        view: &UtxoViewpoint,
    ) -> Result<(), IndexError> {
        (**self).disconnect_block(tx, block, view)
    }
}

/// Read access to committed filters.
pub trait FilterLookup: Send + Sync {
    /// Serialized filter for `hash`, or `None` if the block is not indexed.
    ///
    /// A block with no transactions still has a (non-empty) filter; `None`
    /// only ever means "not indexed".
    fn filter_by_block_hash(&self, hash: &BlockHash) -> Result<Option<Vec<u8>>, IndexError>;
}
