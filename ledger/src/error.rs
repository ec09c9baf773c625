use thiserror::Error;

use ember_transactions::TxError;
use ember_types::Hash;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("block index {actual} does not extend the chain (expected {expected})")]
    StaleIndex { expected: u64, actual: u64 },

    #[error("previous hash {actual} does not match the chain head {expected}")]
    BadPreviousHash { expected: Hash, actual: Hash },

    #[error("stored hash does not match the block contents")]
    BadHash,

    #[error("hash has too few leading zero bits: required {required}, got {actual}")]
    BadProofOfWork { required: u32, actual: u32 },

    #[error("timestamp decreases relative to the previous block")]
    BadTimestamp,

    #[error("invalid transactions: {0}")]
    BadTransactions(#[from] TxError),

    #[error("block payload does not match the configured variant")]
    BadPayload,

    #[error("chain is empty")]
    EmptyChain,

    #[error("replacement chain is not preferred over the current chain")]
    NotPreferred,
}

impl ChainError {
    /// Whether this is the losing side of a successor race rather than a
    /// malformed or forged block.
    pub fn is_stale(&self) -> bool {
        matches!(self, ChainError::StaleIndex { .. })
    }
}
