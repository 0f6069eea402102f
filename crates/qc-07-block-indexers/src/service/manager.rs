//! Index Manager
//!
//! Drives every registered [`Indexer`] from the chain-state machine's
//! transactions.
//!
//! ## Responsibilities
//!
//! 1. Initialize indexers and provision their buckets on first run
//! 2. Fan connect/disconnect events out to every active indexer, in
//!    registration order for connects and reverse order for disconnects
//! 3. Track each index's tip so a skipped or out-of-order event is
//!    rejected instead of silently corrupting the index
//! 4. Permanently drop an index's bucket and tip record
//!
//! Every mutation happens inside a transaction supplied by the caller (or,
//! for provisioning and drops, opened here); nothing is written outside one.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::keys::{decode_tip, encode_tip, tip_key, INDEX_TIPS_BUCKET};
use crate::domain::{IndexTip, UtxoViewpoint};
use crate::error::IndexError;
use crate::ports::{ChainBlock, IndexDatabase, Indexer, StorageTx};

/// Chain event delivered to indexers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockEvent {
    Connect,
    Disconnect,
}

/// Lifecycle state of a registered indexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexerState {
    Uninitialized,
    Registered,
    Active,
    Removed,
}

impl fmt::Display for IndexerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IndexerState::Uninitialized => "uninitialized",
            IndexerState::Registered => "registered",
            IndexerState::Active => "active",
            IndexerState::Removed => "removed",
        };
        f.write_str(label)
    }
}

struct RegisteredIndexer {
    indexer: Box<dyn Indexer>,
    state: IndexerState,
}

/// Orchestrates a set of indexers against one storage engine.
pub struct IndexManager<D: IndexDatabase> {
    db: Arc<D>,
    indexers: Vec<RegisteredIndexer>,
}

impl<D: IndexDatabase> IndexManager<D> {
    /// Register `indexers` in the given order.
    pub fn new(db: Arc<D>, indexers: Vec<Box<dyn Indexer>>) -> Self {
        let indexers = indexers
            .into_iter()
            .map(|indexer| RegisteredIndexer {
                indexer,
                state: IndexerState::Uninitialized,
            })
            .collect();

        Self { db, indexers }
    }

    /// Current lifecycle state of the index stored under `key`.
    pub fn state(&self, key: &str) -> Option<IndexerState> {
        self.indexers
            .iter()
            .find(|entry| entry.indexer.key() == key)
            .map(|entry| entry.state)
    }

    /// Initialize every indexer, then provision storage.
    pub fn init(&mut self) -> Result<(), IndexError> {
        for entry in &mut self.indexers {
            if entry.state != IndexerState::Uninitialized {
                continue;
            }

            entry.indexer.init().map_err(|err| match err {
                IndexError::InitFailed { .. } => err,
                other => IndexError::InitFailed {
                    name: entry.indexer.name().to_string(),
                    reason: other.to_string(),
                },
            })?;
            entry.state = IndexerState::Registered;
        }

        self.provision()
    }

    /// Create storage for every registered indexer that has none yet.
    ///
    /// Each index is created in its own transaction together with its tip
    /// record, so a failure leaves no half-provisioned index behind.
    pub fn provision(&mut self) -> Result<(), IndexError> {
        self.db.update(|tx| {
            if !tx.bucket_exists(INDEX_TIPS_BUCKET)? {
                tx.create_bucket(INDEX_TIPS_BUCKET)?;
            }
            Ok(())
        })?;

        for entry in &mut self.indexers {
            match entry.state {
                IndexerState::Registered => {}
                IndexerState::Active | IndexerState::Removed => continue,
                IndexerState::Uninitialized => {
                    return Err(IndexError::NotActive {
                        index: entry.indexer.name().to_string(),
                        state: entry.state.to_string(),
                    })
                }
            }

            let indexer = &entry.indexer;
            let provisioned = self
                .db
                .view(|tx| Ok(tx.get(INDEX_TIPS_BUCKET, tip_key(indexer.key()))?.is_some()))?;

            if !provisioned {
                info!("[qc-07] Creating the {}", indexer.name());
                self.db.update(|tx| {
                    indexer.create(tx)?;
                    write_tip(tx, indexer.key(), &IndexTip::unset())
                })?;
            }

            entry.state = IndexerState::Active;
        }

        Ok(())
    }

    /// Deliver a chain event to every active indexer inside the caller's
    /// transaction.
    ///
    /// The first failure is returned immediately; the caller must roll the
    /// transaction back.
    pub fn notify(
        &self,
        event: BlockEvent,
        tx: &mut dyn StorageTx,
        block: &dyn ChainBlock,
        view: &UtxoViewpoint,
    ) -> Result<(), IndexError> {
        let live: Vec<&RegisteredIndexer> = self
            .indexers
            .iter()
            .filter(|entry| entry.state != IndexerState::Removed)
            .collect();

        if let Some(entry) = live.iter().find(|e| e.state != IndexerState::Active) {
            return Err(IndexError::NotActive {
                index: entry.indexer.name().to_string(),
                state: entry.state.to_string(),
            });
        }

        match event {
            BlockEvent::Connect => {
                for entry in live {
                    connect_one(entry.indexer.as_ref(), tx, block, view)?;
                }
            }
            BlockEvent::Disconnect => {
                for entry in live.into_iter().rev() {
                    disconnect_one(entry.indexer.as_ref(), tx, block, view)?;
                }
            }
        }

        Ok(())
    }

    pub fn connect_block(
        &self,
        tx: &mut dyn StorageTx,
        block: &dyn ChainBlock,
        view: &UtxoViewpoint,
    ) -> Result<(), IndexError> {
        self.notify(BlockEvent::Connect, tx, block, view)
    }

    pub fn disconnect_block(
        &self,
        tx: &mut dyn StorageTx,
        block: &dyn ChainBlock,
        view: &UtxoViewpoint,
    ) -> Result<(), IndexError> {
        self.notify(BlockEvent::Disconnect, tx, block, view)
    }

    /// Stored tip of the index under `key`, if it is provisioned.
    pub fn index_tip(&self, key: &str) -> Result<Option<IndexTip>, IndexError> {
        self.db.view(|tx| {
            if !tx.bucket_exists(INDEX_TIPS_BUCKET)? {
                return Ok(None);
            }
            tx.get(INDEX_TIPS_BUCKET, tip_key(key))?
                .map(|bytes| decode_tip(&bytes))
                .transpose()
        })
    }

    /// Permanently remove the index under `key`.
    ///
    /// Takes `&mut self`, so no `notify` can be in flight for it.
    pub fn drop(&mut self, key: &str) -> Result<(), IndexError> {
        let entry = self
            .indexers
            .iter_mut()
            .find(|entry| entry.indexer.key() == key && entry.state != IndexerState::Removed)
            .ok_or_else(|| IndexError::UnknownIndex {
                key: key.to_string(),
            })?;

        drop_index(self.db.as_ref(), key, entry.indexer.name())?;
        entry.state = IndexerState::Removed;
        Ok(())
    }
}

/// Remove an index's bucket and tip record from `db`.
///
/// Returns `Ok(false)` when the index is not in the database.
pub fn drop_index<D: IndexDatabase>(db: &D, key: &str, name: &str) -> Result<bool, IndexError> {
    let dropped = db.update(|tx| {
        let registered = tx.bucket_exists(INDEX_TIPS_BUCKET)?
            && tx.get(INDEX_TIPS_BUCKET, tip_key(key))?.is_some();
        let has_bucket = tx.bucket_exists(key)?;

        if !registered && !has_bucket {
            return Ok(false);
        }

        if has_bucket {
            tx.delete_bucket(key)?;
        }
        if registered {
            tx.delete(INDEX_TIPS_BUCKET, tip_key(key))?;
        }
        Ok(true)
    })?;

    if dropped {
        info!("[qc-07] Dropped {}", name);
    } else {
        info!("[qc-07] Not dropping {} because it does not exist", name);
    }

    Ok(dropped)
}

fn read_tip(tx: &dyn StorageTx, indexer: &dyn Indexer) -> Result<IndexTip, IndexError> {
    match tx.get(INDEX_TIPS_BUCKET, tip_key(indexer.key()))? {
        Some(bytes) => decode_tip(&bytes),
        None => Err(IndexError::UnknownIndex {
            key: indexer.key().to_string(),
        }),
    }
}

fn write_tip(tx: &mut dyn StorageTx, key: &str, tip: &IndexTip) -> Result<(), IndexError> {
    tx.put(INDEX_TIPS_BUCKET, tip_key(key), &encode_tip(tip)?)?;
    Ok(())
}

fn connect_one(
    indexer: &dyn Indexer,
    tx: &mut dyn StorageTx,
    block: &dyn ChainBlock,
    view: &UtxoViewpoint,
) -> Result<(), IndexError> {
    let tip = read_tip(tx, indexer)?;
    if !tip.is_unset() && tip.block_hash != block.parent_hash() {
        return Err(IndexError::TipMismatch {
            index: indexer.name().to_string(),
            expected: tip.block_hash,
            found: block.parent_hash(),
        });
    }

    indexer.connect_block(tx, block, view)?;

    let new_tip = IndexTip {
        block_hash: block.hash(),
        height: Some(block.height()),
    };
    write_tip(tx, indexer.key(), &new_tip)?;

    debug!(
        index = indexer.name(),
        block_hash = %block.hash(),
        height = block.height(),
        "[qc-07] Indexed connected block"
    );
    Ok(())
}

fn disconnect_one(
    indexer: &dyn Indexer,
    tx: &mut dyn StorageTx,
    block: &dyn ChainBlock,
    view: &UtxoViewpoint,
) -> Result<(), IndexError> {
    let tip = read_tip(tx, indexer)?;
    if tip.block_hash != block.hash() {
        return Err(IndexError::TipMismatch {
            index: indexer.name().to_string(),
            expected: tip.block_hash,
            found: block.hash(),
        });
    }

    indexer.disconnect_block(tx, block, view)?;

    let new_tip = IndexTip {
        block_hash: block.parent_hash(),
        height: block.height().checked_sub(1),
    };
    write_tip(tx, indexer.key(), &new_tip)?;

    debug!(
        index = indexer.name(),
        block_hash = %block.hash(),
        height = block.height(),
        "[qc-07] Unindexed disconnected block"
    );
    Ok(())
}
