//! # Reorg Consistency Tests
//!
//! After any sequence of connects and disconnects the filter bucket must
//! hold exactly one entry per block on the active chain, and readers must
//! only ever observe committed states.

use proptest::prelude::*;
use qc_07_block_indexers::{
    Block, BlockHash, BlockTransaction, FilterIndex, FilterIndexConfig, FilterLookup,
    InMemoryIndexDb, IndexDatabase, IndexManager, IndexTip, TxHash, UtxoViewpoint, CF_INDEX_KEY,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// TEST HELPERS
// =============================================================================

fn hash_for(id: u32) -> BlockHash {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(&(id + 1).to_be_bytes());
    BlockHash::new(bytes)
}

fn block_on(chain: &[Block], id: u32, txs: Vec<BlockTransaction>) -> Block {
    let parent = chain.last().map(|b| b.hash).unwrap_or(BlockHash::ZERO);
    Block::new(hash_for(id), parent, chain.len() as u64, txs)
}

fn txs_for(id: u32, count: usize) -> Vec<BlockTransaction> {
    (0..count)
        .map(|i| BlockTransaction::new(format!("tx-{}-{}", id, i).into_bytes()))
        .collect()
}

fn setup() -> (
    Arc<InMemoryIndexDb>,
    Arc<FilterIndex<InMemoryIndexDb>>,
    IndexManager<InMemoryIndexDb>,
) {
    let db = Arc::new(InMemoryIndexDb::new());
    let index = Arc::new(FilterIndex::new(db.clone(), FilterIndexConfig::default()));
    let mut manager = IndexManager::new(db.clone(), vec![Box::new(index.clone())]);
    manager.init().unwrap();
    (db, index, manager)
}

fn stored_hashes(db: &InMemoryIndexDb) -> BTreeSet<Vec<u8>> {
    db.bucket_contents(CF_INDEX_KEY)
        .unwrap_or_default()
        .into_keys()
        .collect()
}

fn chain_hashes(chain: &[Block]) -> BTreeSet<Vec<u8>> {
    chain.iter().map(|b| b.hash.as_bytes().to_vec()).collect()
}

// =============================================================================
// REORGS
// =============================================================================

#[test]
fn test_single_block_reorg() {
    let (db, lookup, manager) = setup();
    let view = UtxoViewpoint::new();

    let a = Block::new(hash_for(0), BlockHash::ZERO, 0, txs_for(0, 1));
    let b = Block::new(hash_for(1), a.hash, 1, txs_for(1, 2));
    let b_prime = Block::new(hash_for(2), a.hash, 1, txs_for(2, 3));

    db.update(|tx| manager.connect_block(tx, &a, &view)).unwrap();
    db.update(|tx| manager.connect_block(tx, &b, &view)).unwrap();
    db.update(|tx| manager.disconnect_block(tx, &b, &view)).unwrap();
    db.update(|tx| manager.connect_block(tx, &b_prime, &view))
        .unwrap();

    assert!(lookup.filter_by_block_hash(&a.hash).unwrap().is_some());
    assert_eq!(lookup.filter_by_block_hash(&b.hash).unwrap(), None);
    let filter = lookup.filter_for_block(&b_prime.hash).unwrap().unwrap();
    assert_eq!(filter.n(), 3);
    assert_eq!(stored_hashes(&db).len(), 2);
    assert_eq!(
        manager.index_tip(CF_INDEX_KEY).unwrap(),
        Some(IndexTip {
            block_hash: b_prime.hash,
            height: Some(1)
        })
    );
}

#[test]
fn test_unwind_to_empty_resets_tip() {
    let (db, _, manager) = setup();
    let view = UtxoViewpoint::new();
    let mut chain = Vec::new();

    for id in 0..4 {
        let block = block_on(&chain, id, txs_for(id, 2));
        db.update(|tx| manager.connect_block(tx, &block, &view))
            .unwrap();
        chain.push(block);
    }
    while let Some(block) = chain.pop() {
        db.update(|tx| manager.disconnect_block(tx, &block, &view))
            .unwrap();
    }

    assert!(stored_hashes(&db).is_empty());
    assert_eq!(
        manager.index_tip(CF_INDEX_KEY).unwrap(),
        Some(IndexTip::unset())
    );
}

#[test]
fn test_random_transactions_always_match() {
    let (db, lookup, manager) = setup();
    let view = UtxoViewpoint::new();
    let mut rng = StdRng::seed_from_u64(7);
    let mut chain = Vec::new();

    for id in 0..20 {
        let count = rng.gen_range(0..30);
        let txs: Vec<BlockTransaction> = (0..count)
            .map(|_| {
                let len = rng.gen_range(1..200);
                BlockTransaction::new((0..len).map(|_| rng.gen::<u8>()).collect::<Vec<u8>>())
            })
            .collect();
        let block = block_on(&chain, id, txs);
        db.update(|tx| manager.connect_block(tx, &block, &view))
            .unwrap();
        chain.push(block);
    }

    for block in &chain {
        let filter = lookup.filter_for_block(&block.hash).unwrap().unwrap();
        assert_eq!(filter.n() as usize, block.transactions.len());
        for raw in &block.transactions {
            let hash = TxHash::digest(&raw.raw);
            assert!(filter.matches(hash.as_ref()).unwrap());
        }
    }
}

// =============================================================================
// CONCURRENT READERS
// =============================================================================

#[test]
fn test_readers_see_only_committed_filters() {
    let (db, lookup, manager) = setup();
    let view = UtxoViewpoint::new();
    let done = AtomicBool::new(false);
    let blocks: Vec<Block> = {
        let mut chain = Vec::new();
        for id in 0..50 {
            let block = block_on(&chain, id, txs_for(id, (id % 5) as usize));
            chain.push(block);
        }
        chain
    };

    std::thread::scope(|scope| {
        scope.spawn(|| {
            while !done.load(Ordering::Acquire) {
                for block in &blocks {
                    if let Some(filter) = lookup.filter_for_block(&block.hash).unwrap() {
                        assert_eq!(filter.n() as usize, block.transactions.len());
                    }
                }
            }
        });

        for block in &blocks {
            db.update(|tx| manager.connect_block(tx, block, &view))
                .unwrap();
        }
        for block in blocks.iter().rev().take(25) {
            db.update(|tx| manager.disconnect_block(tx, block, &view))
                .unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert_eq!(stored_hashes(&db), chain_hashes(&blocks[..25]));
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// `true` connects a fresh block on the tip, `false` disconnects the tip.
    #[test]
    fn prop_bucket_tracks_active_chain(ops in prop::collection::vec(any::<bool>(), 1..40)) {
        let (db, lookup, manager) = setup();
        let view = UtxoViewpoint::new();
        let mut chain: Vec<Block> = Vec::new();
        // Full bucket contents before each block on `chain` was connected.
        let mut before_connect = Vec::new();
        let mut next_id = 0u32;

        for connect in ops {
            if connect {
                let block = block_on(&chain, next_id, txs_for(next_id, (next_id % 4) as usize));
                next_id += 1;
                before_connect.push(db.bucket_contents(CF_INDEX_KEY));
                db.update(|tx| manager.connect_block(tx, &block, &view)).unwrap();
                chain.push(block);
            } else if let Some(block) = chain.pop() {
                db.update(|tx| manager.disconnect_block(tx, &block, &view)).unwrap();
                prop_assert_eq!(lookup.filter_by_block_hash(&block.hash).unwrap(), None);
                prop_assert_eq!(db.bucket_contents(CF_INDEX_KEY), before_connect.pop().flatten());
            }

            prop_assert_eq!(stored_hashes(&db), chain_hashes(&chain));
        }

        let expected_tip = match chain.last() {
            Some(block) => IndexTip { block_hash: block.hash, height: Some(block.height) },
            None => IndexTip::unset(),
        };
        prop_assert_eq!(manager.index_tip(CF_INDEX_KEY).unwrap(), Some(expected_tip));
    }
}
