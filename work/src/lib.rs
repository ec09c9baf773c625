//! Proof-of-work difficulty: target representation and the retarget
//! algorithm. The nonce search itself lives next to the orchestrator that
//! owns its cancel flag.

mod difficulty;

pub use difficulty::{difficulty_to_bits, DifficultyAdjuster};
