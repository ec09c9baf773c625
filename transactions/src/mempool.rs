//! The mempool: validly formed, fully fundable transactions awaiting
//! inclusion in a block. Arrival order is preserved.

use std::collections::HashSet;

use ember_types::{Hash, TxParams};

use crate::error::TxError;
use crate::transaction::{Transaction, TxKind};
use crate::utxo::{OutPoint, UtxoSet};

#[derive(Debug, Default)]
pub struct Mempool {
    entries: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.entries
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.iter().any(|tx| tx.hash == *hash)
    }

    /// Validate and insert a transaction.
    ///
    /// Returns `Ok(true)` when inserted, `Ok(false)` when the transaction
    /// was already present (resubmission is a no-op). The transaction is
    /// checked against the unspent set *minus* outputs already claimed by
    /// earlier mempool entries.
    pub fn add(
        &mut self,
        tx: Transaction,
        utxo: &UtxoSet,
        params: &TxParams,
    ) -> Result<bool, TxError> {
        if tx.kind == TxKind::Reward {
            return Err(TxError::RewardInMempool);
        }
        if self.contains(&tx.hash) {
            return Ok(false);
        }

        let projected = self.projected_spends();
        for input in &tx.inputs {
            if projected.contains(&input.outpoint()) {
                return Err(TxError::MempoolConflict(input.outpoint()));
            }
        }

        crate::validation::verify_transaction(&tx, utxo, params)?;
        self.entries.push(tx);
        Ok(true)
    }

    /// Outpoints already claimed by mempool entries.
    fn projected_spends(&self) -> HashSet<OutPoint> {
        self.entries
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|i| i.outpoint()))
            .collect()
    }

    /// Select entries for the next block, in arrival order, starting at
    /// block position `start_index` (1, just after the reward).
    ///
    /// An entry is taken only if its signed-over `index` matches the
    /// position it would occupy and its inputs are still unspent and not
    /// claimed by an earlier selection; anything else is skipped and stays
    /// in the pool. Selected entries are not removed — removal happens
    /// when the mined block is accepted.
    pub fn select_for_block(&self, utxo: &UtxoSet, start_index: u64) -> Vec<Transaction> {
        let mut selected = Vec::new();
        let mut claimed: HashSet<OutPoint> = HashSet::new();
        let mut position = start_index;

        for tx in &self.entries {
            if tx.index != position {
                continue;
            }
            let spendable = tx.inputs.iter().all(|input| {
                let op = input.outpoint();
                utxo.contains(&op) && !claimed.contains(&op)
            });
            if !spendable {
                continue;
            }
            claimed.extend(tx.inputs.iter().map(|i| i.outpoint()));
            selected.push(tx.clone());
            position += 1;
        }

        selected
    }

    /// Drop every entry that appears in an accepted block or whose inputs
    /// the block spent. Returns the number of entries removed.
    pub fn remove_confirmed(&mut self, block_txs: &[Transaction]) -> usize {
        let confirmed_hashes: HashSet<Hash> = block_txs.iter().map(|tx| tx.hash).collect();
        let spent: HashSet<OutPoint> = block_txs
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|i| i.outpoint()))
            .collect();

        let before = self.entries.len();
        self.entries.retain(|tx| {
            !confirmed_hashes.contains(&tx.hash)
                && tx.inputs.iter().all(|i| !spent.contains(&i.outpoint()))
        });
        before - self.entries.len()
    }

    /// Re-validate the whole pool against a new unspent set, keeping only
    /// entries that remain fundable. Used after whole-chain replacement.
    pub fn revalidate(&mut self, utxo: &UtxoSet, params: &TxParams) {
        let previous = std::mem::take(&mut self.entries);
        for tx in previous {
            match self.add(tx, utxo, params) {
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "dropped mempool entry after chain change"),
            }
        }
    }
}
