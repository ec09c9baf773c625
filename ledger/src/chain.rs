//! The blockchain: an ordered, validated sequence of blocks plus the
//! unspent-output set derived from it.

use ember_transactions::{verify_block_transactions, UtxoSet};
use ember_types::{ChainParams, Hash};
use ember_work::DifficultyAdjuster;

use crate::block::{Block, BlockData};
use crate::error::ChainError;

/// The authoritative chain state.
///
/// Nodes start empty; the first accepted index-0 block becomes genesis.
/// The chain only grows — reorganization is whole-chain replacement via
/// [`replace`], never a partial rewind.
///
/// [`replace`]: Blockchain::replace
#[derive(Clone, Debug)]
pub struct Blockchain {
    params: ChainParams,
    blocks: Vec<Block>,
    utxo: UtxoSet,
    adjuster: Option<DifficultyAdjuster>,
    /// Σ 2^target_bits over accepted blocks; zero when PoW is off.
    cumulative_work: f64,
}

impl Blockchain {
    pub fn new(params: ChainParams) -> Self {
        let adjuster = params
            .block_gen
            .clone()
            .map(DifficultyAdjuster::new);
        Self {
            params,
            blocks: Vec::new(),
            utxo: UtxoSet::new(),
            adjuster,
            cumulative_work: 0.0,
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn head(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn utxo(&self) -> &UtxoSet {
        &self.utxo
    }

    /// The index the next appended block must carry.
    pub fn next_index(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Required leading zero bits for the next block; `None` when PoW is
    /// disabled.
    pub fn target_bits(&self) -> Option<u32> {
        self.adjuster.as_ref().map(|a| a.target_bits())
    }

    pub fn cumulative_work(&self) -> f64 {
        self.cumulative_work
    }

    /// Validate `block` against the current head and append it.
    pub fn append(&mut self, block: Block) -> Result<(), ChainError> {
        self.check_next(&block)?;

        if let Some(adjuster) = &mut self.adjuster {
            self.cumulative_work += 2f64.powi(adjuster.target_bits() as i32);
            adjuster.observe(block.timestamp);
        }
        if let BlockData::Transactions(txs) = &block.data {
            for tx in txs {
                self.utxo.apply_transaction(tx);
            }
        }
        self.blocks.push(block);
        Ok(())
    }

    /// All validation for a candidate successor, without mutating state.
    pub fn check_next(&self, block: &Block) -> Result<(), ChainError> {
        let expected = self.next_index();
        if block.index != expected {
            return Err(ChainError::StaleIndex {
                expected,
                actual: block.index,
            });
        }

        match self.head() {
            None => {
                if !block.previous_hash.is_zero() {
                    return Err(ChainError::BadPreviousHash {
                        expected: Hash::ZERO,
                        actual: block.previous_hash,
                    });
                }
            }
            Some(head) => {
                if block.previous_hash != head.hash {
                    return Err(ChainError::BadPreviousHash {
                        expected: head.hash,
                        actual: block.previous_hash,
                    });
                }
                if block.timestamp < head.timestamp {
                    return Err(ChainError::BadTimestamp);
                }
            }
        }

        if block.compute_hash() != block.hash {
            return Err(ChainError::BadHash);
        }

        if let Some(adjuster) = &self.adjuster {
            let required = adjuster.target_bits();
            let actual = block.hash.leading_zero_bits();
            if actual < required {
                return Err(ChainError::BadProofOfWork { required, actual });
            }
        }

        match (&block.data, self.params.transaction.as_ref()) {
            (BlockData::Transactions(txs), Some(tx_params)) => {
                verify_block_transactions(txs, &self.utxo, tx_params)?;
            }
            (BlockData::Text(_), None) => {}
            _ => return Err(ChainError::BadPayload),
        }

        Ok(())
    }

    /// Full validation from genesis. An empty chain is not valid.
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.blocks.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        let mut replay = Blockchain::new(self.params.clone());
        for block in &self.blocks {
            replay.append(block.clone())?;
        }
        Ok(())
    }

    /// Atomically swap in a foreign chain.
    ///
    /// Accepted iff it is strictly longer than the current chain, passes
    /// full validation from genesis, and — when PoW is on — carries
    /// strictly more cumulative work (the work replayed from the foreign
    /// chain's own timestamps).
    pub fn replace(&mut self, blocks: Vec<Block>) -> Result<(), ChainError> {
        let mut candidate = Blockchain::new(self.params.clone());
        for block in blocks {
            candidate.append(block)?;
        }

        let longer = candidate.len() > self.len();
        let heavier = !self.params.pow_enabled()
            || candidate.cumulative_work > self.cumulative_work;
        if !longer || !heavier {
            return Err(ChainError::NotPreferred);
        }

        tracing::info!(
            from = self.len(),
            to = candidate.len(),
            "replacing local chain"
        );
        *self = candidate;
        Ok(())
    }
}
