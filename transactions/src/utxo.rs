//! The unspent-transaction-output set.
//!
//! Lookups are by `(output_hash, output_index)`; iteration preserves
//! block-then-output insertion order, which is the order the RPC listing
//! promises.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use ember_types::Hash;

use crate::transaction::{Transaction, TxOutput};

/// Key of an output: the producing transaction's hash plus the output's
/// index within it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u64,
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.hash, self.index)
    }
}

/// One entry of the unspent set, as listed over RPC.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Utxo {
    pub output_hash: Hash,
    pub output_index: u64,
    pub output: TxOutput,
}

/// Insertion-ordered set of unspent outputs.
///
/// Spent entries are tombstoned rather than removed so the survivors keep
/// their relative order; the index map gives O(1) lookup and spend.
#[derive(Clone, Debug, Default)]
pub struct UtxoSet {
    slots: Vec<(OutPoint, Option<TxOutput>)>,
    index: HashMap<OutPoint, usize>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.index.contains_key(outpoint)
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&TxOutput> {
        let slot = *self.index.get(outpoint)?;
        self.slots[slot].1.as_ref()
    }

    /// Add an output. Re-inserting a live outpoint is a no-op.
    pub fn insert(&mut self, outpoint: OutPoint, output: TxOutput) {
        if self.index.contains_key(&outpoint) {
            return;
        }
        self.index.insert(outpoint, self.slots.len());
        self.slots.push((outpoint, Some(output)));
    }

    /// Remove and return an output.
    pub fn spend(&mut self, outpoint: &OutPoint) -> Option<TxOutput> {
        let slot = self.index.remove(outpoint)?;
        self.slots[slot].1.take()
    }

    /// Apply an accepted transaction: add its outputs, then consume its
    /// inputs.
    pub fn apply_transaction(&mut self, tx: &Transaction) {
        for (i, output) in tx.outputs.iter().enumerate() {
            self.insert(
                OutPoint {
                    hash: tx.hash,
                    index: i as u64,
                },
                output.clone(),
            );
        }
        for input in &tx.inputs {
            self.spend(&input.outpoint());
        }
    }

    /// Live entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &TxOutput)> {
        self.slots
            .iter()
            .filter_map(|(op, output)| output.as_ref().map(|o| (op, o)))
    }

    /// The listing handed out over RPC, in block-then-output order.
    pub fn to_list(&self) -> Vec<Utxo> {
        self.iter()
            .map(|(op, output)| Utxo {
                output_hash: op.hash,
                output_index: op.index,
                output: output.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_types::Address;

    fn output(amount: u64, addr: &str) -> TxOutput {
        TxOutput {
            amount,
            address: Address::new(addr),
        }
    }

    fn op(byte: u8, index: u64) -> OutPoint {
        OutPoint {
            hash: Hash::new([byte; 32]),
            index,
        }
    }

    #[test]
    fn insert_get_spend() {
        let mut set = UtxoSet::new();
        set.insert(op(1, 0), output(50, "a"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&op(1, 0)).unwrap().amount, 50);

        let spent = set.spend(&op(1, 0)).unwrap();
        assert_eq!(spent.amount, 50);
        assert!(set.is_empty());
        assert!(set.spend(&op(1, 0)).is_none());
    }

    #[test]
    fn iteration_preserves_insertion_order_across_spends() {
        let mut set = UtxoSet::new();
        set.insert(op(1, 0), output(1, "a"));
        set.insert(op(2, 0), output(2, "b"));
        set.insert(op(3, 0), output(3, "c"));
        set.spend(&op(2, 0));

        let amounts: Vec<u64> = set.iter().map(|(_, o)| o.amount).collect();
        assert_eq!(amounts, [1, 3]);
    }

    #[test]
    fn apply_transaction_adds_outputs_then_spends_inputs() {
        let funding = Transaction::reward(0, Address::new("a"), 50);
        let mut set = UtxoSet::new();
        set.apply_transaction(&funding);
        assert_eq!(set.len(), 1);

        let mut spend = Transaction::standard(
            1,
            vec![OutPoint {
                hash: funding.hash,
                index: 0,
            }],
            vec![output(20, "b"), output(30, "c")],
        );
        spend.inputs[0].signature = "unchecked-here".into();
        set.apply_transaction(&spend);

        assert_eq!(set.len(), 2);
        let listed = set.to_list();
        assert_eq!(listed[0].output.amount, 20);
        assert_eq!(listed[1].output.amount, 30);
        assert_eq!(listed[0].output_hash, spend.hash);
        assert_eq!(listed[0].output_index, 0);
    }
}
