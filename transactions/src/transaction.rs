//! The transaction model: inputs referencing unspent outputs, outputs
//! assigning amounts to addresses, and the canonical hash the signatures
//! cover.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use ember_crypto::{sha256, sign_message, Keypair};
use ember_types::{Address, Hash};

use crate::utxo::OutPoint;

/// Transaction kind. Exactly one `reward` opens every block; everything
/// else is `standard`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Reward,
    Standard,
}

/// A reference to an unspent output, plus the spender's signature over the
/// containing transaction's hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxInput {
    /// Hash of the transaction that produced the output being spent.
    pub output_hash: Hash,
    /// Index of that output within its transaction.
    pub output_index: u64,
    /// base64/DER ECDSA signature over this transaction's hash, made with
    /// the key whose address owns the referenced output.
    pub signature: String,
}

impl TxInput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            hash: self.output_hash,
            index: self.output_index,
        }
    }
}

/// An amount assigned to an address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: u64,
    pub address: Address,
}

/// A transaction. Field order is the canonical JSON order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub kind: TxKind,
    /// Position within the containing block. Covered by the hash, so a
    /// signed transaction is bound to one block position.
    pub index: u64,
    pub hash: Hash,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Build a reward transaction paying `amount` to `address`.
    pub fn reward(index: u64, address: Address, amount: u64) -> Self {
        let mut tx = Self {
            kind: TxKind::Reward,
            index,
            hash: Hash::ZERO,
            inputs: Vec::new(),
            outputs: vec![TxOutput { amount, address }],
        };
        tx.hash = tx.compute_hash();
        tx
    }

    /// Build an unsigned standard transaction. Call [`sign_input`] for each
    /// input before submitting it anywhere.
    ///
    /// [`sign_input`]: Transaction::sign_input
    pub fn standard(index: u64, spends: Vec<OutPoint>, outputs: Vec<TxOutput>) -> Self {
        let inputs = spends
            .into_iter()
            .map(|op| TxInput {
                output_hash: op.hash,
                output_index: op.index,
                signature: String::new(),
            })
            .collect();
        let mut tx = Self {
            kind: TxKind::Standard,
            index,
            hash: Hash::ZERO,
            inputs,
            outputs,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    /// Sign one input with the key owning the output it spends.
    ///
    /// Signatures are excluded from the hash, so signing after hashing is
    /// well-defined.
    pub fn sign_input(&mut self, input_index: usize, keypair: &Keypair) {
        let message = self.signing_message();
        self.inputs[input_index].signature = sign_message(message.as_bytes(), keypair);
    }

    /// The canonical hash preimage: stringified `index`, then per input its
    /// `output_hash` and `output_index`, then per output its `amount` and
    /// `address`. Signatures are excluded.
    pub fn preimage(&self) -> String {
        let mut s = String::new();
        let _ = write!(s, "{}", self.index);
        for input in &self.inputs {
            let _ = write!(s, "{}{}", input.output_hash, input.output_index);
        }
        for output in &self.outputs {
            let _ = write!(s, "{}{}", output.amount, output.address);
        }
        s
    }

    pub fn compute_hash(&self) -> Hash {
        sha256(self.preimage().as_bytes())
    }

    /// The bytes each input signature covers: the ASCII hex of the hash.
    pub fn signing_message(&self) -> String {
        self.hash.to_string()
    }

    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }
}
