use crate::core::proof_of_work::{MiningOutcome, ProofOfWork};
use crate::core::{Block, Consensus};
use crate::error::{BlockchainError, Result};
use crate::storage::MemoryPool;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Turns pending transactions into blocks on top of the current tip
pub struct Miner {
    consensus: Arc<Consensus>,
    mempool: Arc<MemoryPool>,
    difficulty: u32,
    max_attempts: u64,
}

impl Miner {
    pub fn new(
        consensus: Arc<Consensus>,
        mempool: Arc<MemoryPool>,
        difficulty: u32,
        max_attempts: u64,
    ) -> Miner {
        Miner {
            consensus,
            mempool,
            difficulty,
            max_attempts,
        }
    }

    /// Mine one block from the memory pool.
    ///
    /// Returns `Ok(None)` when nothing is pending. Proof-of-work runs against a
    /// snapshot of the tip without holding the ledger lock; the append then fails
    /// with `StaleTip` if another block landed in the meantime. Mined transactions
    /// leave the pool only after the append succeeds.
    pub fn mine_pending(&self) -> Result<Option<Block>> {
        let ledger = self.consensus.get_ledger();
        let mut pending = self.mempool.drain();

        // Already on chain, e.g. after adopting a peer's chain
        let chain = ledger.get_chain();
        let on_chain: HashSet<&str> = chain
            .iter()
            .flat_map(|block| block.get_transactions())
            .map(|tx| tx.get_id())
            .collect();
        let (known, fresh): (Vec<_>, Vec<_>) = pending
            .drain(..)
            .partition(|tx| on_chain.contains(tx.get_id()));
        if !known.is_empty() {
            warn!(
                "Dropping {} pending transactions already on chain",
                known.len()
            );
            self.mempool.evict_mined(&known);
        }
        if fresh.is_empty() {
            return Ok(None);
        }

        let tip = chain
            .last()
            .cloned()
            .ok_or_else(|| BlockchainError::Mining("ledger has no genesis block".to_string()))?;
        let candidate = Block::new_candidate(
            tip.get_index() + 1,
            tip.get_hash(),
            fresh,
            self.difficulty,
        )?;
        info!(
            "Mining block {} with {} transactions (difficulty: {})",
            candidate.get_index(),
            candidate.get_transactions().len(),
            self.difficulty
        );

        match ProofOfWork::new_proof_of_work(candidate, self.max_attempts).run() {
            MiningOutcome::Solved(block) => {
                self.consensus.append_mined(block.clone(), tip.get_hash())?;
                self.mempool.evict_mined(block.get_transactions());
                Ok(Some(block))
            }
            MiningOutcome::Exhausted(block) => Err(BlockchainError::Mining(format!(
                "no nonce met difficulty {} for block {} within {} attempts",
                self.difficulty,
                block.get_index(),
                self.max_attempts
            ))),
        }
    }
}
