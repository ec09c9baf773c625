//! Adaptive proof-of-work difficulty with periodic retargeting.
//!
//! Difficulty is a positive real `D`; a block hash meets it when its
//! big-endian leading-zero-bit count is at least `floor(log2(D))`. Every
//! `difficulty_adjust_after` blocks the difficulty is scaled by the ratio
//! of expected to actual window time, clamped to the configured factor
//! limit. Replaying an adjuster over a foreign chain's own timestamps
//! reproduces the target every one of its blocks had to meet.

use ember_types::{PowParams, Timestamp};

/// Tracks difficulty across a growing chain.
///
/// Feed every accepted block's timestamp through [`observe`] in chain
/// order; [`target_bits`] then yields the requirement for the *next*
/// block index. A retarget fires the instant a window fills, so block
/// `k*N` is already measured against the adjusted difficulty.
///
/// [`observe`]: DifficultyAdjuster::observe
/// [`target_bits`]: DifficultyAdjuster::target_bits
#[derive(Clone, Debug)]
pub struct DifficultyAdjuster {
    params: PowParams,
    /// Current raw difficulty.
    difficulty: f64,
    /// Blocks observed so far.
    count: u64,
    /// Timestamp of the first block of the window being filled.
    window_start: Timestamp,
}

impl DifficultyAdjuster {
    pub fn new(params: PowParams) -> Self {
        let difficulty = params.difficulty_init;
        Self {
            params,
            difficulty,
            count: 0,
            window_start: Timestamp::EPOCH,
        }
    }

    /// The current raw difficulty.
    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    /// Required leading zero bits for the next block: `floor(log2(D))`.
    pub fn target_bits(&self) -> u32 {
        difficulty_to_bits(self.difficulty)
    }

    /// Record an accepted block's timestamp.
    ///
    /// When this block completes a retarget window the difficulty for the
    /// following window is recomputed from the window just filled:
    ///
    /// `D *= clamp(T_expected / T_actual, 1/limit, limit)`
    ///
    /// with `T_expected = N * time_expected` and `T_actual` the span from
    /// the first to the last block of that window.
    pub fn observe(&mut self, timestamp: Timestamp) {
        let n = self.params.difficulty_adjust_after;
        if n == 0 {
            return;
        }

        if self.count % n == 0 {
            self.window_start = timestamp;
        }
        self.count += 1;

        if self.count % n == 0 {
            let expected = self.params.window_time_expected_millis() as f64;
            let actual = self.window_start.millis_until(timestamp).max(1) as f64;
            let limit = self.params.difficulty_adjust_factor_limit;
            let factor = (expected / actual).clamp(1.0 / limit, limit);
            self.difficulty *= factor;
        }
    }
}

/// `floor(log2(difficulty))`, floored at zero bits for difficulties below 2.
pub fn difficulty_to_bits(difficulty: f64) -> u32 {
    difficulty.log2().floor().max(0.0) as u32
}
