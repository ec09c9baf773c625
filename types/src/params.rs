//! Chain parameters loaded from the node's TOML configuration.
//!
//! Both sections are optional: a missing `[block_gen]` disables
//! proof-of-work, a missing `[transaction]` disables the transaction
//! subsystem (block payloads are then plain text). The parameters are an
//! immutable value loaded at startup and passed by reference into the
//! subsystems that need them.

use serde::{Deserialize, Serialize};

/// Proof-of-work parameters (`[block_gen]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowParams {
    /// Desired seconds between consecutive blocks.
    pub time_expected: u64,
    /// Initial difficulty, applied from genesis until the first retarget.
    pub difficulty_init: f64,
    /// Retarget every this many blocks.
    pub difficulty_adjust_after: u64,
    /// Clamp on the per-retarget multiplicative change.
    pub difficulty_adjust_factor_limit: f64,
}

impl PowParams {
    /// Expected wall-clock time for one retarget window, in milliseconds.
    pub fn window_time_expected_millis(&self) -> u64 {
        self.difficulty_adjust_after * self.time_expected * 1000
    }
}

/// Transaction parameters (`[transaction]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxParams {
    /// The fixed amount paid by every block's reward transaction.
    pub reward_amount: u64,
}

/// Everything the consensus rules are parameterized on.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainParams {
    #[serde(default)]
    pub block_gen: Option<PowParams>,
    #[serde(default)]
    pub transaction: Option<TxParams>,
}

impl ChainParams {
    pub fn pow_enabled(&self) -> bool {
        self.block_gen.is_some()
    }

    pub fn transactions_enabled(&self) -> bool {
        self.transaction.is_some()
    }
}
