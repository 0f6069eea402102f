//! Committed Filter Index
//!
//! Maintains a block hash -> GCS filter mapping for every connected block.
//!
//! ## Record Format
//!
//! ```text
//! <hash> = <filter>
//!
//!   Field     Type        Size
//!   hash      BlockHash   32 bytes
//!   filter    []byte      variable (>= 4 bytes)
//! ```

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::domain::gcs_filter::build_block_filter;
use crate::domain::keys::{filter_entry_key, CF_INDEX_KEY, CF_INDEX_NAME};
use crate::domain::{BlockHash, FilterIndexConfig, GcsFilter, UtxoViewpoint};
use crate::error::IndexError;
use crate::metrics::{IndexObserver, NoOpObserver};
use crate::ports::{ChainBlock, FilterLookup, IndexDatabase, Indexer, StorageTx};
use crate::service::manager::drop_index;

/// Filter-by-block-hash index.
///
/// Plugs into the [`IndexManager`](crate::IndexManager), which calls the
/// connect/disconnect hooks inside the chain's own transactions. The
/// database handle is only used for lookups outside those transactions.
pub struct FilterIndex<D: IndexDatabase> {
    db: Arc<D>,
    config: FilterIndexConfig,
    observer: Arc<dyn IndexObserver>,
}

impl<D: IndexDatabase> FilterIndex<D> {
    pub fn new(db: Arc<D>, config: FilterIndexConfig) -> Self {
        Self {
            db,
            config,
            observer: Arc::new(NoOpObserver),
        }
    }

    /// Attach an observer for build/store/lookup events.
    pub fn with_observer(mut self, observer: Arc<dyn IndexObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &FilterIndexConfig {
        &self.config
    }

    /// Stored filter for `hash`, decoded with this index's parameters.
    pub fn filter_for_block(&self, hash: &BlockHash) -> Result<Option<GcsFilter>, IndexError> {
        self.filter_by_block_hash(hash)?
            .map(|bytes| GcsFilter::from_bytes(self.config.p, self.config.key, &bytes))
            .transpose()
            .map_err(IndexError::from)
    }

    /// Remove the filter index from `db` if it exists.
    pub fn drop_index(db: &D) -> Result<bool, IndexError> {
        drop_index(db, CF_INDEX_KEY, CF_INDEX_NAME)
    }

    fn generate_filter(&self, block: &dyn ChainBlock) -> Result<Vec<u8>, IndexError> {
        let hash = block.hash();
        let started = Instant::now();

        let filter = build_block_filter(block, &self.config)?;
        let bytes = filter.to_bytes();

        self.observer
            .on_filter_built(&hash, filter.n() as usize, bytes.len(), started.elapsed());
        debug!(
            block_hash = %hash,
            elements = filter.n(),
            bytes = bytes.len(),
            "[qc-07] Generated committed filter"
        );

        Ok(bytes)
    }
}

impl<D: IndexDatabase> Indexer for FilterIndex<D> {
    fn init(&self) -> Result<(), IndexError> {
        self.config.validate().map_err(|e| IndexError::InitFailed {
            name: CF_INDEX_NAME.to_string(),
            reason: e.to_string(),
        })
    }

    fn key(&self) -> &str {
        CF_INDEX_KEY
    }

    fn name(&self) -> &str {
        CF_INDEX_NAME
    }

    fn create(&self, tx: &mut dyn StorageTx) -> Result<(), IndexError> {
        tx.create_bucket(CF_INDEX_KEY)?;
        Ok(())
    }

    fn connect_block(
        &self,
        tx: &mut dyn StorageTx,
        block: &dyn ChainBlock,
        _view: &UtxoViewpoint,
    ) -> Result<(), IndexError> {
        let hash = block.hash();
        let filter_bytes = self.generate_filter(block)?;

        tx.put(CF_INDEX_KEY, filter_entry_key(&hash), &filter_bytes)?;

        self.observer.on_filter_stored(&hash, filter_bytes.len());
        debug!(block_hash = %hash, height = block.height(), "[qc-07] Stored committed filter");

        Ok(())
    }

    fn disconnect_block(
        &self,
        tx: &mut dyn StorageTx,
        block: &dyn ChainBlock,
        _view: &UtxoViewpoint,
    ) -> Result<(), IndexError> {
        let hash = block.hash();

        if tx.get(CF_INDEX_KEY, filter_entry_key(&hash))?.is_none() {
            warn!(block_hash = %hash, "[qc-07] Disconnect for block with no stored filter");
            return Err(IndexError::MissingFilterEntry { block_hash: hash });
        }

        tx.delete(CF_INDEX_KEY, filter_entry_key(&hash))?;

        self.observer.on_filter_removed(&hash);
        debug!(block_hash = %hash, height = block.height(), "[qc-07] Removed committed filter");

        Ok(())
    }
}

impl<D: IndexDatabase> FilterLookup for FilterIndex<D> {
    fn filter_by_block_hash(&self, hash: &BlockHash) -> Result<Option<Vec<u8>>, IndexError> {
        let started = Instant::now();
        let filter = self.db.view(|tx| {
            // Unprovisioned or dropped index: nothing is indexed.
            if !tx.bucket_exists(CF_INDEX_KEY)? {
                return Ok(None);
            }
            Ok(tx.get(CF_INDEX_KEY, filter_entry_key(hash))?)
        })?;

        self.observer.on_lookup(started.elapsed(), filter.is_some());
        Ok(filter)
    }
}
