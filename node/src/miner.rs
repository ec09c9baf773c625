//! The proof-of-work nonce search.
//!
//! Runs on a dedicated worker thread (the search is CPU-bound). The only
//! shared state with the orchestrator is the atomic cancel flag and the
//! result channel: the orchestrator raises the flag whenever the chain
//! advances, and the thread exits at its next poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use ember_crypto::sha256;
use ember_ledger::{Block, BlockData};
use ember_types::{Hash, Timestamp};

/// Nonce attempts between cancel-flag polls (and timestamp refreshes).
const CANCEL_CHECK_INTERVAL: u64 = 1 << 12;

/// A successfully mined candidate, re-entering the orchestrator through
/// the same validated-insertion path as peer-provided blocks.
#[derive(Debug)]
pub struct MinedBlock {
    pub block: Block,
}

/// Everything a search needs, snapshotted from the chain head.
#[derive(Clone, Debug)]
pub struct MiningCandidate {
    pub index: u64,
    pub previous_hash: Hash,
    pub data: BlockData,
    pub target_bits: u32,
    /// The parent's timestamp; the candidate never goes below it even if
    /// the wall clock steps backwards.
    pub floor_timestamp: Timestamp,
}

/// Start the search on its own thread.
///
/// The thread sends at most one result and exits; when cancelled it sends
/// nothing at all — the miner never reports errors upward.
pub fn spawn(
    candidate: MiningCandidate,
    cancel: Arc<AtomicBool>,
    results: mpsc::Sender<MinedBlock>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let data_fragment = candidate.data.preimage_fragment();
        let mut timestamp = Timestamp::now().max(candidate.floor_timestamp);
        let mut nonce = 0u64;

        loop {
            if nonce % CANCEL_CHECK_INTERVAL == 0 {
                if cancel.load(Ordering::Relaxed) {
                    tracing::debug!(index = candidate.index, nonce, "mining cancelled");
                    return;
                }
                timestamp = Timestamp::now().max(candidate.floor_timestamp);
            }

            let preimage = Block::preimage_with(
                candidate.index,
                timestamp,
                &candidate.previous_hash,
                nonce,
                &data_fragment,
            );
            let hash = sha256(preimage.as_bytes());

            if hash.leading_zero_bits() >= candidate.target_bits {
                let block = Block::new(
                    candidate.index,
                    timestamp,
                    candidate.data,
                    candidate.previous_hash,
                    nonce,
                );
                tracing::debug!(
                    index = block.index,
                    nonce,
                    bits = block.hash.leading_zero_bits(),
                    "mined block"
                );
                let _ = results.blocking_send(MinedBlock { block });
                return;
            }

            nonce += 1;
        }
    })
}
