use thiserror::Error;

use ember_types::Hash;

use crate::utxo::OutPoint;

#[derive(Debug, Error)]
pub enum TxError {
    #[error("stored hash {0} does not match recomputed hash")]
    BadHash(Hash),

    #[error("reward transaction must have no inputs")]
    RewardHasInputs,

    #[error("reward transaction must have exactly one output, found {0}")]
    RewardShape(usize),

    #[error("reward amount must be {expected}, found {actual}")]
    BadRewardAmount { expected: u64, actual: u64 },

    #[error("standard transaction must have at least one input")]
    NoInputs,

    #[error("input references no unspent output: {0:?}")]
    UnknownInput(OutPoint),

    #[error("input signature does not verify for {0:?}")]
    BadSignature(OutPoint),

    #[error("inputs ({inputs}) and outputs ({outputs}) must balance exactly")]
    AmountMismatch { inputs: u64, outputs: u64 },

    #[error("output amounts must be positive")]
    ZeroOutput,

    #[error("amount overflow")]
    AmountOverflow,

    #[error("block transaction list is empty")]
    EmptyBlock,

    #[error("first transaction of a block must be the reward")]
    MissingReward,

    #[error("reward transaction at position {0}, only position 0 is allowed")]
    MisplacedReward(usize),

    #[error("transaction index {actual} does not match block position {expected}")]
    BadIndex { expected: u64, actual: u64 },

    #[error("two inputs reference the same unspent output: {0:?}")]
    DoubleSpend(OutPoint),

    #[error("reward transactions are not accepted into the mempool")]
    RewardInMempool,

    #[error("input already claimed by a mempool entry: {0:?}")]
    MempoolConflict(OutPoint),
}
