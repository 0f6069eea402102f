//! # Index Lifecycle Tests
//!
//! Drives the committed filter index through the `IndexManager` the way the
//! chain-state machine does: one storage transaction per connected or
//! disconnected block.
//!
//! ## Test Categories
//!
//! 1. **Provisioning** - Create-once, restart, drop
//! 2. **Round Trip** - Connect, look up, match
//! 3. **Atomicity** - Failed writes leave no trace
//! 4. **Fatal Paths** - Missing entries, out-of-order events

use qc_07_block_indexers::{
    Block, BlockHash, BlockTransaction, FilterIndex, FilterIndexConfig, FilterLookup,
    InMemoryIndexDb, IndexDatabase, IndexError, IndexManager, IndexMetrics, IndexTip,
    IndexerState, Indexer, StorageError, StorageTx, TxHash, UtxoViewpoint, CF_INDEX_KEY,
    INDEX_TIPS_BUCKET,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// =============================================================================
// TEST HELPERS
// =============================================================================

/// Route index logs to the test harness; set `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn make_block(id: u8, parent: u8, height: u64, txs: &[&str]) -> Block {
    Block::new(
        BlockHash::new([id; 32]),
        BlockHash::new([parent; 32]),
        height,
        txs.iter()
            .map(|raw| BlockTransaction::new(raw.as_bytes()))
            .collect(),
    )
}

fn setup() -> (
    Arc<InMemoryIndexDb>,
    Arc<FilterIndex<InMemoryIndexDb>>,
    IndexManager<InMemoryIndexDb>,
) {
    init_tracing();
    let db = Arc::new(InMemoryIndexDb::new());
    let index = Arc::new(FilterIndex::new(db.clone(), FilterIndexConfig::default()));
    let mut manager = IndexManager::new(db.clone(), vec![Box::new(index.clone())]);
    manager.init().unwrap();
    (db, index, manager)
}

fn connect(db: &InMemoryIndexDb, manager: &IndexManager<InMemoryIndexDb>, block: &Block) {
    db.update(|tx| manager.connect_block(tx, block, &UtxoViewpoint::new()))
        .unwrap();
}

/// Wraps a transaction and fails every `put`.
struct FailingPutTx<'a> {
    inner: &'a mut dyn StorageTx,
}

impl StorageTx for FailingPutTx<'_> {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        self.inner.bucket_exists(bucket)
    }

    fn create_bucket(&mut self, bucket: &str) -> Result<(), StorageError> {
        self.inner.create_bucket(bucket)
    }

    fn delete_bucket(&mut self, bucket: &str) -> Result<(), StorageError> {
        self.inner.delete_bucket(bucket)
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(bucket, key)
    }

    fn put(&mut self, _: &str, _: &[u8], _: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Backend {
            message: "disk full".to_string(),
        })
    }

    fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<(), StorageError> {
        self.inner.delete(bucket, key)
    }
}

// =============================================================================
// PROVISIONING
// =============================================================================

#[test]
fn test_init_creates_bucket_and_tip() {
    let (db, _, manager) = setup();

    assert_eq!(manager.state(CF_INDEX_KEY), Some(IndexerState::Active));
    assert_eq!(db.bucket_contents(CF_INDEX_KEY).map(|b| b.len()), Some(0));
    assert_eq!(
        manager.index_tip(CF_INDEX_KEY).unwrap(),
        Some(IndexTip::unset())
    );
}

#[test]
fn test_restart_keeps_existing_filters() {
    let (db, lookup, manager) = setup();
    let block = make_block(1, 0, 0, &["coinbase"]);
    connect(&db, &manager, &block);

    let indexer = FilterIndex::new(db.clone(), FilterIndexConfig::default());
    let mut restarted = IndexManager::new(db.clone(), vec![Box::new(indexer)]);
    restarted.init().unwrap();

    assert!(lookup.filter_by_block_hash(&block.hash).unwrap().is_some());
    assert_eq!(
        restarted.index_tip(CF_INDEX_KEY).unwrap(),
        Some(IndexTip {
            block_hash: block.hash,
            height: Some(0)
        })
    );
}

#[test]
fn test_drop_index_removes_everything() {
    let (db, lookup, mut manager) = setup();
    connect(&db, &manager, &make_block(1, 0, 0, &["coinbase"]));

    manager.drop(CF_INDEX_KEY).unwrap();

    assert!(db.bucket_contents(CF_INDEX_KEY).is_none());
    assert_eq!(db.bucket_contents(INDEX_TIPS_BUCKET).map(|b| b.len()), Some(0));
    assert_eq!(manager.state(CF_INDEX_KEY), Some(IndexerState::Removed));
    assert_eq!(
        lookup.filter_by_block_hash(&BlockHash::new([1; 32])).unwrap(),
        None
    );
}

#[test]
fn test_lookup_on_unprovisioned_index_is_miss() {
    let db = Arc::new(InMemoryIndexDb::new());
    let index = FilterIndex::new(db, FilterIndexConfig::default());

    assert_eq!(index.filter_by_block_hash(&BlockHash::new([1; 32])).unwrap(), None);
    assert!(index.filter_for_block(&BlockHash::new([1; 32])).unwrap().is_none());
}

#[test]
fn test_shared_index_reports_to_one_observer() {
    init_tracing();
    let db = Arc::new(InMemoryIndexDb::new());
    let metrics = Arc::new(IndexMetrics::new());
    let index = Arc::new(
        FilterIndex::new(db.clone(), FilterIndexConfig::default()).with_observer(metrics.clone()),
    );
    let mut manager = IndexManager::new(db.clone(), vec![Box::new(index.clone())]);
    manager.init().unwrap();

    let block = make_block(1, 0, 0, &["coinbase", "payment"]);
    connect(&db, &manager, &block);
    index.filter_by_block_hash(&block.hash).unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.filters_built, 1);
    assert_eq!(snapshot.filters_stored, 1);
    assert_eq!(snapshot.lookups_performed, 1);
    assert_eq!(snapshot.lookup_misses, 0);
}

#[test]
fn test_static_drop_on_fresh_database() {
    let db = InMemoryIndexDb::new();
    assert!(!FilterIndex::<InMemoryIndexDb>::drop_index(&db).unwrap());
}

// =============================================================================
// ROUND TRIP
// =============================================================================

#[test]
fn test_connect_then_lookup_matches_every_tx() {
    let (db, lookup, manager) = setup();
    let txs = ["coinbase", "alice-to-bob", "bob-to-carol"];
    let block = make_block(1, 0, 0, &txs);

    connect(&db, &manager, &block);

    let filter = lookup.filter_for_block(&block.hash).unwrap().unwrap();
    assert_eq!(filter.n(), 3);
    for raw in txs {
        let hash = TxHash::digest(raw.as_bytes());
        assert!(filter.matches(hash.as_ref()).unwrap());
    }
}

#[test]
fn test_connect_disconnect_restores_exact_state() {
    let (db, _, manager) = setup();
    let a = make_block(1, 0, 0, &["coinbase-a"]);
    let b = make_block(2, 1, 1, &["coinbase-b", "payment"]);
    connect(&db, &manager, &a);
    let filters_before = db.bucket_contents(CF_INDEX_KEY);
    let tips_before = db.bucket_contents(INDEX_TIPS_BUCKET);

    connect(&db, &manager, &b);
    assert_ne!(db.bucket_contents(CF_INDEX_KEY), filters_before);
    db.update(|tx| manager.disconnect_block(tx, &b, &UtxoViewpoint::new()))
        .unwrap();

    assert_eq!(db.bucket_contents(CF_INDEX_KEY), filters_before);
    assert_eq!(db.bucket_contents(INDEX_TIPS_BUCKET), tips_before);
}

#[test]
fn test_empty_block_vs_unindexed_block() {
    let (db, lookup, manager) = setup();
    let empty = make_block(1, 0, 0, &[]);

    connect(&db, &manager, &empty);

    let stored = lookup.filter_by_block_hash(&empty.hash).unwrap();
    assert!(matches!(stored, Some(ref bytes) if !bytes.is_empty()));
    assert_eq!(
        lookup.filter_by_block_hash(&BlockHash::new([2; 32])).unwrap(),
        None
    );
}

// =============================================================================
// ATOMICITY
// =============================================================================

#[test]
fn test_failed_put_rolls_back_block() {
    let (db, lookup, manager) = setup();
    let block = make_block(1, 0, 0, &["coinbase"]);

    let err = db
        .update(|tx| {
            let mut failing = FailingPutTx { inner: tx };
            manager.connect_block(&mut failing, &block, &UtxoViewpoint::new())
        })
        .unwrap_err();

    assert!(matches!(
        err,
        IndexError::Storage(StorageError::Backend { .. })
    ));
    assert_eq!(lookup.filter_by_block_hash(&block.hash).unwrap(), None);
    assert_eq!(
        manager.index_tip(CF_INDEX_KEY).unwrap(),
        Some(IndexTip::unset())
    );
}

#[test]
fn test_failed_put_keeps_prior_block_intact() {
    let (db, lookup, manager) = setup();
    let a = make_block(1, 0, 0, &["coinbase-a"]);
    let b = make_block(2, 1, 1, &["coinbase-b"]);
    connect(&db, &manager, &a);
    let filters_before = db.bucket_contents(CF_INDEX_KEY);
    let tips_before = db.bucket_contents(INDEX_TIPS_BUCKET);

    let err = db
        .update(|tx| {
            let mut failing = FailingPutTx { inner: tx };
            manager.connect_block(&mut failing, &b, &UtxoViewpoint::new())
        })
        .unwrap_err();

    assert!(matches!(
        err,
        IndexError::Storage(StorageError::Backend { .. })
    ));
    assert_eq!(db.bucket_contents(CF_INDEX_KEY), filters_before);
    assert_eq!(db.bucket_contents(INDEX_TIPS_BUCKET), tips_before);
    assert_eq!(lookup.filter_by_block_hash(&b.hash).unwrap(), None);
    assert!(lookup.filter_for_block(&a.hash).unwrap().is_some());
}

#[test]
fn test_chain_error_after_index_write_rolls_back() {
    let (db, lookup, manager) = setup();
    let block = make_block(1, 0, 0, &["coinbase"]);

    let result: Result<(), IndexError> = db.update(|tx| {
        manager.connect_block(tx, &block, &UtxoViewpoint::new())?;
        Err(IndexError::InvalidConfig("utxo write failed".to_string()))
    });

    assert!(result.is_err());
    assert_eq!(lookup.filter_by_block_hash(&block.hash).unwrap(), None);
}

// =============================================================================
// FATAL PATHS
// =============================================================================

#[test]
fn test_disconnect_without_filter_is_fatal() {
    let db = Arc::new(InMemoryIndexDb::new());
    let index = FilterIndex::new(db.clone(), FilterIndexConfig::default());
    db.update(|tx| index.create(tx)).unwrap();
    let block = make_block(1, 0, 0, &["coinbase"]);

    let err = db
        .update(|tx| index.disconnect_block(tx, &block, &UtxoViewpoint::new()))
        .unwrap_err();

    assert!(matches!(err, IndexError::MissingFilterEntry { block_hash } if block_hash == block.hash));
}

#[test]
fn test_corrupt_stored_filter_is_an_error() {
    let (db, lookup, _) = setup();
    let hash = BlockHash::new([7; 32]);
    db.update(|tx| Ok(tx.put(CF_INDEX_KEY, hash.as_ref(), &[0xff; 4])?))
        .unwrap();

    let err = lookup.filter_for_block(&hash).unwrap_err();
    assert!(matches!(err, IndexError::Filter(_)));
}

#[test]
fn test_skipped_block_rejected() {
    let (db, lookup, manager) = setup();
    connect(&db, &manager, &make_block(1, 0, 0, &["coinbase"]));
    let orphan = make_block(3, 2, 2, &["coinbase-3"]);

    let err = db
        .update(|tx| manager.connect_block(tx, &orphan, &UtxoViewpoint::new()))
        .unwrap_err();

    assert!(matches!(err, IndexError::TipMismatch { .. }));
    assert_eq!(lookup.filter_by_block_hash(&orphan.hash).unwrap(), None);
}

#[test]
fn test_malformed_block_aborts_transaction() {
    let (db, lookup, manager) = setup();
    let block = make_block(1, 0, 0, &["coinbase", ""]);

    let err = db
        .update(|tx| manager.connect_block(tx, &block, &UtxoViewpoint::new()))
        .unwrap_err();

    assert!(matches!(err, IndexError::BlockData(_)));
    assert_eq!(lookup.filter_by_block_hash(&block.hash).unwrap(), None);
    assert_eq!(
        manager.index_tip(CF_INDEX_KEY).unwrap(),
        Some(IndexTip::unset())
    );
}
