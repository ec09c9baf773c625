//! Transaction validation rules.

use std::collections::HashSet;

use ember_crypto::verify_signature;
use ember_types::TxParams;

use crate::error::TxError;
use crate::transaction::{Transaction, TxKind};
use crate::utxo::{OutPoint, UtxoSet};

/// Verify a single transaction against an unspent set.
///
/// Standard transactions must spend only live outputs, carry a valid
/// signature per input, and balance exactly — the design forbids implicit
/// fees. Reward transactions are inputless and pay exactly the configured
/// amount.
pub fn verify_transaction(
    tx: &Transaction,
    utxo: &UtxoSet,
    params: &TxParams,
) -> Result<(), TxError> {
    if tx.compute_hash() != tx.hash {
        return Err(TxError::BadHash(tx.hash));
    }

    match tx.kind {
        TxKind::Reward => {
            if !tx.inputs.is_empty() {
                return Err(TxError::RewardHasInputs);
            }
            if tx.outputs.len() != 1 {
                return Err(TxError::RewardShape(tx.outputs.len()));
            }
            if tx.outputs[0].amount != params.reward_amount {
                return Err(TxError::BadRewardAmount {
                    expected: params.reward_amount,
                    actual: tx.outputs[0].amount,
                });
            }
        }
        TxKind::Standard => {
            if tx.inputs.is_empty() {
                return Err(TxError::NoInputs);
            }
            if tx.outputs.iter().any(|o| o.amount == 0) {
                return Err(TxError::ZeroOutput);
            }

            let message = tx.signing_message();
            let mut input_total: u64 = 0;
            for input in &tx.inputs {
                let outpoint = input.outpoint();
                let Some(spent) = utxo.get(&outpoint) else {
                    return Err(TxError::UnknownInput(outpoint));
                };
                if !verify_signature(message.as_bytes(), &input.signature, &spent.address) {
                    return Err(TxError::BadSignature(outpoint));
                }
                input_total = input_total
                    .checked_add(spent.amount)
                    .ok_or(TxError::AmountOverflow)?;
            }

            let output_total = tx
                .outputs
                .iter()
                .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
                .ok_or(TxError::AmountOverflow)?;
            if input_total != output_total {
                return Err(TxError::AmountMismatch {
                    inputs: input_total,
                    outputs: output_total,
                });
            }
        }
    }

    Ok(())
}

/// Verify a block's ordered transaction list against an unspent set.
///
/// The first transaction must be the reward, the rest standard; indices
/// must match positions; no two inputs may name the same outpoint; each
/// transaction is checked against the set produced by its predecessors.
pub fn verify_block_transactions(
    txs: &[Transaction],
    utxo: &UtxoSet,
    params: &TxParams,
) -> Result<(), TxError> {
    let Some(first) = txs.first() else {
        return Err(TxError::EmptyBlock);
    };
    if first.kind != TxKind::Reward {
        return Err(TxError::MissingReward);
    }

    let mut seen_inputs: HashSet<OutPoint> = HashSet::new();
    let mut scratch = utxo.clone();

    for (position, tx) in txs.iter().enumerate() {
        if position > 0 && tx.kind != TxKind::Standard {
            return Err(TxError::MisplacedReward(position));
        }
        if tx.index != position as u64 {
            return Err(TxError::BadIndex {
                expected: position as u64,
                actual: tx.index,
            });
        }
        for input in &tx.inputs {
            if !seen_inputs.insert(input.outpoint()) {
                return Err(TxError::DoubleSpend(input.outpoint()));
            }
        }
        verify_transaction(tx, &scratch, params)?;
        scratch.apply_transaction(tx);
    }

    Ok(())
}
