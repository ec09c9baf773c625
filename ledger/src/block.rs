//! Blocks: immutable units of the ledger.

use serde::{Deserialize, Serialize};

use ember_crypto::sha256;
use ember_transactions::Transaction;
use ember_types::{Hash, Timestamp};

/// A block's payload. The basic variant carries a raw string; the
/// transaction variant carries an ordered transaction list. The wire
/// distinguishes the two by the JSON type of the `data` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockData {
    Transactions(Vec<Transaction>),
    Text(String),
}

impl BlockData {
    /// The payload's contribution to the block hash preimage: the raw
    /// string for text, the canonical JSON array for transactions.
    pub fn preimage_fragment(&self) -> String {
        match self {
            BlockData::Text(s) => s.clone(),
            BlockData::Transactions(txs) => {
                serde_json::to_string(txs).expect("transactions always serialize to JSON")
            }
        }
    }
}

/// One block. Field order is the canonical JSON order; `hash` is derived
/// from the other fields but stored because it participates in equality
/// and peer exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// 0-based height.
    pub index: u64,
    /// Wall clock at creation, millisecond precision.
    pub timestamp: Timestamp,
    pub data: BlockData,
    /// Hash of the preceding block; [`Hash::ZERO`] for genesis.
    pub previous_hash: Hash,
    /// Proof-of-work nonce; always zero when PoW is disabled.
    pub nonce: u64,
    pub hash: Hash,
}

impl Block {
    /// Build a block and fill in its hash.
    pub fn new(
        index: u64,
        timestamp: Timestamp,
        data: BlockData,
        previous_hash: Hash,
        nonce: u64,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            data,
            previous_hash,
            nonce,
            hash: Hash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Build an index-0 block rooted at the genesis sentinel.
    pub fn genesis(timestamp: Timestamp, data: BlockData) -> Self {
        Self::new(0, timestamp, data, Hash::ZERO, 0)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash.is_zero()
    }

    /// The canonical hash preimage: stringified `index`, `timestamp`,
    /// `previous_hash`, `nonce`, then the payload fragment.
    pub fn preimage(&self) -> String {
        Self::preimage_with(
            self.index,
            self.timestamp,
            &self.previous_hash,
            self.nonce,
            &self.data.preimage_fragment(),
        )
    }

    /// The preimage formula, exposed so the nonce search can iterate
    /// without rebuilding a `Block` per attempt.
    pub fn preimage_with(
        index: u64,
        timestamp: Timestamp,
        previous_hash: &Hash,
        nonce: u64,
        data_fragment: &str,
    ) -> String {
        format!(
            "{}{}{}{}{}",
            index,
            timestamp.as_millis(),
            previous_hash,
            nonce,
            data_fragment
        )
    }

    pub fn compute_hash(&self) -> Hash {
        sha256(self.preimage().as_bytes())
    }
}
