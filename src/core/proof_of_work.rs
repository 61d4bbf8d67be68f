use crate::core::Block;
use log::{debug, info};

/// Default attempt budget for a single mining run
pub const MAX_MINING_ATTEMPTS: u64 = 100_000;

/// Result of a bounded mining run.
///
/// An `Exhausted` block carries the last hash that was tried. It does not meet
/// its difficulty and must never be appended.
#[derive(Debug, Clone, PartialEq)]
pub enum MiningOutcome {
    Solved(Block),
    Exhausted(Block),
}

impl MiningOutcome {
    pub fn is_solved(&self) -> bool {
        matches!(self, MiningOutcome::Solved(_))
    }

    pub fn block(&self) -> &Block {
        match self {
            MiningOutcome::Solved(block) | MiningOutcome::Exhausted(block) => block,
        }
    }

    pub fn into_block(self) -> Block {
        match self {
            MiningOutcome::Solved(block) | MiningOutcome::Exhausted(block) => block,
        }
    }
}

pub struct ProofOfWork {
    block: Block,
    max_attempts: u64,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block, max_attempts: u64) -> ProofOfWork {
        ProofOfWork {
            block,
            max_attempts,
        }
    }

    /// Recomputed hash matches the stored one and meets the declared difficulty.
    /// The genesis block is exempt from the difficulty requirement.
    pub fn validate(block: &Block) -> bool {
        if !block.has_valid_hash() {
            return false;
        }
        block.is_genesis() || Block::meets_difficulty(block.get_hash(), block.get_difficulty())
    }

    /// Search nonces starting from the block's current one until the hash
    /// meets the difficulty or the attempt budget runs out.
    pub fn run(self) -> MiningOutcome {
        let ProofOfWork {
            mut block,
            max_attempts,
        } = self;
        let difficulty = block.get_difficulty();
        debug!(
            "Mining block {} at difficulty {difficulty} (budget {max_attempts})",
            block.get_index()
        );

        let mut nonce = block.get_nonce();
        for _ in 0..max_attempts {
            let hash = block.hash_with_nonce(nonce);
            if Block::meets_difficulty(&hash, difficulty) {
                block.nonce = nonce;
                block.hash = hash;
                info!(
                    "Mined block {} with nonce {nonce}: {}",
                    block.get_index(),
                    block.get_hash()
                );
                return MiningOutcome::Solved(block);
            }
            block.nonce = nonce;
            block.hash = hash;
            nonce = nonce.wrapping_add(1);
        }

        if max_attempts == 0 {
            block.hash = block.calculate_hash();
        }
        debug!(
            "Gave up mining block {} after {max_attempts} attempts",
            block.get_index()
        );
        MiningOutcome::Exhausted(block)
    }
}

/// Mine `candidate` with the given attempt budget
pub fn mine(candidate: Block, max_attempts: u64) -> MiningOutcome {
    ProofOfWork::new_proof_of_work(candidate, max_attempts).run()
}
