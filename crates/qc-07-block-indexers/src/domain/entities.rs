//! Chain entities seen by indexers
//!
//! The chain-state machine owns blocks and the unspent-output view; these
//! types are the shapes indexers receive at each connect/disconnect event.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::error::BlockDataError;
use crate::ports::ChainBlock;

/// A 32-byte block identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// The all-zero hash, used as "no parent" / "no tip".
    pub const ZERO: BlockHash = BlockHash([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for BlockHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", hex::encode(self.0))
    }
}

/// A 32-byte transaction identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Double SHA-256 of the serialized transaction.
    pub fn digest(raw: &[u8]) -> Self {
        let first = Sha256::digest(raw);
        let second = Sha256::digest(first);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for TxHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", hex::encode(self.0))
    }
}

/// A serialized transaction as carried in a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTransaction {
    pub raw: Vec<u8>,
}

impl BlockTransaction {
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        Self { raw: raw.into() }
    }
}

/// A block as delivered by the chain-state machine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    /// Header hash assigned by consensus.
    pub hash: BlockHash,
    /// Hash of the previous block (`BlockHash::ZERO` for genesis).
    pub parent_hash: BlockHash,
    /// Height in the chain.
    pub height: u64,
    /// Ordered transactions.
    pub transactions: Vec<BlockTransaction>,
}

impl Block {
    pub fn new(
        hash: BlockHash,
        parent_hash: BlockHash,
        height: u64,
        transactions: Vec<BlockTransaction>,
    ) -> Self {
        Self {
            hash,
            parent_hash,
            height,
            transactions,
        }
    }
}

impl ChainBlock for Block {
    fn hash(&self) -> BlockHash {
        self.hash
    }

    fn parent_hash(&self) -> BlockHash {
        self.parent_hash
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    fn tx_hash(&self, index: usize) -> Result<TxHash, BlockDataError> {
        let tx = self
            .transactions
            .get(index)
            .ok_or(BlockDataError::IndexOutOfRange {
                index,
                count: self.transactions.len(),
            })?;

        // An empty encoding can't be a transaction that passed validation.
        if tx.raw.is_empty() {
            return Err(BlockDataError::MalformedTransaction { index });
        }

        Ok(TxHash::digest(&tx.raw))
    }
}

/// Reference to a specific transaction output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: TxHash,
    pub index: u32,
}

/// An unspent output as tracked by the chain-state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub amount: u64,
    pub script: Vec<u8>,
    pub block_height: u64,
    pub is_coinbase: bool,
}

/// Snapshot of unspent outputs at the point a block is connected or
/// disconnected.
#[derive(Clone, Debug, Default)]
pub struct UtxoViewpoint {
    entries: HashMap<OutPoint, UtxoEntry>,
}

impl UtxoViewpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.entries.insert(outpoint, entry);
    }

    pub fn lookup(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.entries.get(outpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Last block an index has processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTip {
    pub block_hash: BlockHash,
    /// `None` until the first block is connected (or after the genesis
    /// block is disconnected).
    pub height: Option<u64>,
}

impl IndexTip {
    /// Tip of a freshly provisioned index.
    pub const fn unset() -> Self {
        Self {
            block_hash: BlockHash::ZERO,
            height: None,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.height.is_none() && self.block_hash.is_zero()
    }
}
