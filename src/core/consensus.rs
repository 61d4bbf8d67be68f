//! Block, chain and fork-choice validation
//!
//! `Consensus` is the only writer of its [`Ledger`]. Every mutation takes the
//! ledger's write lock before validating and keeps it until the chain has been
//! extended or replaced, so no other writer can slip in between the check and
//! the update. Rejections leave the ledger untouched.

use crate::core::{Block, Ledger, ProofOfWork};
use crate::error::{BlockViolation, BlockchainError, Result};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

pub struct Consensus {
    ledger: Arc<Ledger>,
}

impl Consensus {
    pub fn new(ledger: Arc<Ledger>) -> Consensus {
        Consensus { ledger }
    }

    pub fn get_ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Append a single block on top of the current tip.
    ///
    /// On an empty ledger only a genesis block (index 0, empty previous hash) is
    /// accepted. Otherwise the block must extend the tip by one, link to the tip's
    /// hash and carry its own recomputed hash.
    pub fn append_block(&self, block: Block) -> Result<()> {
        let mut chain = self.ledger.write();
        Self::check_extends(&chain, &block)?;
        info!(
            "Appended block {} ({} transactions): {}",
            block.get_index(),
            block.get_transactions().len(),
            block.get_hash()
        );
        Arc::make_mut(&mut chain).push(block);
        Ok(())
    }

    /// Append a block mined against `expected_tip_hash`. Fails with
    /// [`BlockchainError::StaleTip`] when the ledger moved on while mining.
    pub fn append_mined(&self, block: Block, expected_tip_hash: &str) -> Result<()> {
        let mut chain = self.ledger.write();
        let actual = chain
            .last()
            .map(|tip| tip.get_hash().to_string())
            .unwrap_or_default();
        if actual != expected_tip_hash {
            return Err(BlockchainError::StaleTip {
                expected: expected_tip_hash.to_string(),
                actual,
            });
        }

        Self::check_extends(&chain, &block)?;
        info!(
            "Appended mined block {} ({} transactions): {}",
            block.get_index(),
            block.get_transactions().len(),
            block.get_hash()
        );
        Arc::make_mut(&mut chain).push(block);
        Ok(())
    }

    /// `true` when the whole chain links up and every block's contents are valid.
    /// Stops at the first violation.
    pub fn validate_chain(chain: &[Block]) -> bool {
        match Self::check_chain(chain) {
            Ok(()) => true,
            Err(e) => {
                warn!("Chain of {} blocks rejected: {e}", chain.len());
                false
            }
        }
    }

    /// Same as [`Consensus::validate_chain`] but reports the violated invariant
    pub fn check_chain(chain: &[Block]) -> Result<()> {
        let genesis = chain.first().ok_or(BlockViolation::EmptyChain)?;
        Self::check_genesis(genesis)?;
        Self::check_contents(genesis)?;

        for pair in chain.windows(2) {
            Self::check_link(&pair[0], &pair[1])?;
            Self::check_contents(&pair[1])?;
        }

        let mut seen = HashSet::new();
        for tx in chain.iter().flat_map(|block| block.get_transactions()) {
            if !seen.insert(tx.get_id()) {
                return Err(BlockViolation::DuplicateTransaction {
                    id: tx.get_id().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn validate_proof_of_work(block: &Block) -> bool {
        ProofOfWork::validate(block)
    }

    /// Fork choice: replace the ledger with `candidate` only if it is valid,
    /// every block carries its proof-of-work and it is strictly longer than the
    /// current chain.
    pub fn accept_if_better(&self, candidate: Vec<Block>) -> bool {
        let mut chain = self.ledger.write();
        match Self::check_replacement(&chain, &candidate) {
            Ok(()) => {
                info!(
                    "Replacing chain of {} blocks with chain of {} blocks",
                    chain.len(),
                    candidate.len()
                );
                *chain = Arc::new(candidate);
                true
            }
            Err(e) => {
                warn!("Rejected candidate chain of {} blocks: {e}", candidate.len());
                false
            }
        }
    }

    fn check_replacement(current: &[Block], candidate: &[Block]) -> Result<()> {
        if candidate.len() <= current.len() {
            return Err(BlockViolation::ChainNotLonger {
                current: current.len(),
                candidate: candidate.len(),
            }
            .into());
        }
        Self::check_chain(candidate)?;
        if let Some(block) = candidate.iter().find(|b| !Self::validate_proof_of_work(b)) {
            return Err(BlockViolation::InsufficientWork {
                index: block.get_index(),
                difficulty: block.get_difficulty(),
            }
            .into());
        }
        Ok(())
    }

    fn check_extends(chain: &[Block], block: &Block) -> Result<()> {
        match chain.last() {
            None => Self::check_genesis(block)?,
            Some(tip) => Self::check_link(tip, block)?,
        }
        Self::check_contents(block)?;

        if !Self::validate_proof_of_work(block) {
            return Err(BlockViolation::InsufficientWork {
                index: block.get_index(),
                difficulty: block.get_difficulty(),
            }
            .into());
        }

        let known: HashSet<&str> = chain
            .iter()
            .flat_map(|b| b.get_transactions())
            .map(|tx| tx.get_id())
            .collect();
        if let Some(tx) = block
            .get_transactions()
            .iter()
            .find(|tx| known.contains(tx.get_id()))
        {
            return Err(BlockViolation::DuplicateTransaction {
                id: tx.get_id().to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn check_genesis(block: &Block) -> Result<()> {
        if block.get_index() != 0 {
            return Err(BlockViolation::NotGenesis {
                index: block.get_index(),
            }
            .into());
        }
        if !block.get_previous_hash().is_empty() {
            return Err(BlockViolation::GenesisPreviousHash {
                previous_hash: block.get_previous_hash().to_string(),
            }
            .into());
        }
        Self::check_hash(block)
    }

    fn check_link(previous: &Block, block: &Block) -> Result<()> {
        let expected = previous.get_index() + 1;
        if block.get_index() != expected {
            return Err(BlockViolation::IndexMismatch {
                expected,
                actual: block.get_index(),
            }
            .into());
        }
        if block.get_previous_hash() != previous.get_hash() {
            return Err(BlockViolation::PreviousHashMismatch {
                expected: previous.get_hash().to_string(),
                actual: block.get_previous_hash().to_string(),
            }
            .into());
        }
        Self::check_hash(block)
    }

    fn check_hash(block: &Block) -> Result<()> {
        let expected = block.calculate_hash();
        if expected != block.get_hash() {
            return Err(BlockViolation::HashMismatch {
                index: block.get_index(),
                expected,
                actual: block.get_hash().to_string(),
            }
            .into());
        }
        Ok(())
    }

    // Merkle root, every transaction, and no id twice within the block
    fn check_contents(block: &Block) -> Result<()> {
        if !block.verify_merkle_root() {
            return Err(BlockViolation::MerkleRootMismatch {
                index: block.get_index(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for tx in block.get_transactions() {
            if !tx.validate() {
                return Err(BlockViolation::InvalidTransaction {
                    index: block.get_index(),
                    id: tx.get_id().to_string(),
                }
                .into());
            }
            if !seen.insert(tx.get_id()) {
                return Err(BlockViolation::DuplicateTransaction {
                    id: tx.get_id().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::proof_of_work::MAX_MINING_ATTEMPTS;
    use crate::testnet::test_utils::{build_chain, mine_on, signed_tx};
    use crate::wallet::Wallet;
    use std::thread;

    fn engine_with_genesis() -> Consensus {
        Consensus::new(Arc::new(Ledger::with_genesis()))
    }

    #[test]
    fn test_genesis_accepted_into_empty_ledger_without_work() {
        let engine = Consensus::new(Arc::new(Ledger::new()));

        // Declared difficulty the genesis hash almost surely does not meet
        let mut genesis = Block::genesis();
        genesis.difficulty = 16;
        genesis.hash = genesis.calculate_hash();
        assert!(!Block::meets_difficulty(genesis.get_hash(), 16));

        engine.append_block(genesis).unwrap();
        assert_eq!(engine.get_ledger().len(), 1);
    }

    #[test]
    fn test_empty_ledger_rejects_non_genesis() {
        let engine = Consensus::new(Arc::new(Ledger::new()));
        let block = mine_on(&Block::genesis(), vec![], 0);

        let err = engine.append_block(block).unwrap_err();
        assert!(matches!(
            err,
            BlockchainError::InvalidBlock(BlockViolation::NotGenesis { index: 1 })
        ));

        let mut linked = Block::genesis();
        linked.previous_hash = "ab".to_string();
        linked.hash = linked.calculate_hash();
        assert!(matches!(
            engine.append_block(linked),
            Err(BlockchainError::InvalidBlock(
                BlockViolation::GenesisPreviousHash { .. }
            ))
        ));
        assert!(engine.get_ledger().is_empty());
    }

    #[test]
    fn test_append_extends_tip() {
        let engine = engine_with_genesis();
        let wallet = Wallet::new().unwrap();
        let tip = engine.get_ledger().get_tip().unwrap();
        let block = mine_on(&tip, vec![signed_tx(&wallet, "bob", 10.0)], 1);

        engine.append_block(block.clone()).unwrap();
        assert_eq!(engine.get_ledger().len(), 2);
        assert_eq!(engine.get_ledger().get_tip().unwrap(), block);
        assert!(engine.get_ledger().contains_transaction(block.get_transactions()[0].get_id()));
    }

    #[test]
    fn test_wrong_previous_hash_is_rejected() {
        let engine = engine_with_genesis();
        let tip = engine.get_ledger().get_tip().unwrap();
        let mut block = mine_on(&tip, vec![], 0);
        block.previous_hash = "deadbeef".to_string();
        block.hash = block.calculate_hash();

        let err = engine.append_block(block).unwrap_err();
        assert!(matches!(
            err,
            BlockchainError::InvalidBlock(BlockViolation::PreviousHashMismatch { .. })
        ));
        assert_eq!(engine.get_ledger().len(), 1);
    }

    #[test]
    fn test_wrong_index_and_forged_hash_are_rejected() {
        let engine = engine_with_genesis();
        let tip = engine.get_ledger().get_tip().unwrap();

        let mut skipped = mine_on(&tip, vec![], 0);
        skipped.index = 2;
        skipped.hash = skipped.calculate_hash();
        assert!(matches!(
            engine.append_block(skipped),
            Err(BlockchainError::InvalidBlock(BlockViolation::IndexMismatch {
                expected: 1,
                actual: 2
            }))
        ));

        let mut forged = mine_on(&tip, vec![], 0);
        forged.hash = "00".repeat(32);
        assert!(matches!(
            engine.append_block(forged),
            Err(BlockchainError::InvalidBlock(BlockViolation::HashMismatch { .. }))
        ));
        assert_eq!(engine.get_ledger().len(), 1);
    }

    #[test]
    fn test_unmined_block_is_rejected() {
        let engine = engine_with_genesis();
        let tip = engine.get_ledger().get_tip().unwrap();
        let candidate = Block::new_candidate(1, tip.get_hash(), vec![], 64).unwrap();

        assert!(matches!(
            engine.append_block(candidate),
            Err(BlockchainError::InvalidBlock(
                BlockViolation::InsufficientWork { index: 1, .. }
            ))
        ));
    }

    #[test]
    fn test_invalid_transaction_and_merkle_root_are_rejected() {
        let engine = engine_with_genesis();
        let wallet = Wallet::new().unwrap();
        let tip = engine.get_ledger().get_tip().unwrap();

        let mut tampered = mine_on(&tip, vec![signed_tx(&wallet, "bob", 10.0)], 0);
        tampered.transactions[0].amount = 99.0;
        assert!(matches!(
            engine.append_block(tampered),
            Err(BlockchainError::InvalidBlock(
                BlockViolation::MerkleRootMismatch { index: 1 }
            ))
        ));

        let mut unsigned = signed_tx(&wallet, "bob", 10.0);
        unsigned.signature.clear();
        let block = mine_on(&tip, vec![unsigned], 0);
        assert!(matches!(
            engine.append_block(block),
            Err(BlockchainError::InvalidBlock(
                BlockViolation::InvalidTransaction { index: 1, .. }
            ))
        ));
    }

    #[test]
    fn test_transaction_cannot_be_mined_twice() {
        let engine = engine_with_genesis();
        let wallet = Wallet::new().unwrap();
        let tx = signed_tx(&wallet, "bob", 10.0);

        let first = mine_on(&engine.get_ledger().get_tip().unwrap(), vec![tx.clone()], 0);
        engine.append_block(first).unwrap();

        let second = mine_on(&engine.get_ledger().get_tip().unwrap(), vec![tx], 0);
        assert!(matches!(
            engine.append_block(second),
            Err(BlockchainError::InvalidBlock(
                BlockViolation::DuplicateTransaction { .. }
            ))
        ));
    }

    #[test]
    fn test_append_mined_detects_stale_tip() {
        let engine = engine_with_genesis();
        let genesis = engine.get_ledger().get_tip().unwrap();

        let ours = mine_on(&genesis, vec![], 1);
        let theirs = mine_on(&genesis, vec![], 0);
        engine.append_block(theirs).unwrap();

        let err = engine.append_mined(ours, genesis.get_hash()).unwrap_err();
        assert!(matches!(err, BlockchainError::StaleTip { .. }));
        assert_eq!(engine.get_ledger().len(), 2);
    }

    #[test]
    fn test_validate_chain_short_circuits_on_bad_link() {
        let wallet = Wallet::new().unwrap();
        let mut chain = build_chain(&wallet, 4, 1);
        assert!(Consensus::validate_chain(&chain));

        chain[2].previous_hash = chain[0].hash.clone();
        chain[2].hash = chain[2].calculate_hash();
        assert!(!Consensus::validate_chain(&chain));
        assert!(!Consensus::validate_chain(&[]));
    }

    #[test]
    fn test_validate_chain_rejects_repeated_transaction() {
        let wallet = Wallet::new().unwrap();
        let tx = signed_tx(&wallet, "bob", 10.0);
        let genesis = Block::genesis();
        let first = mine_on(&genesis, vec![tx.clone()], 0);
        let second = mine_on(&first, vec![tx], 0);

        assert!(matches!(
            Consensus::check_chain(&[genesis, first, second]),
            Err(BlockchainError::InvalidBlock(
                BlockViolation::DuplicateTransaction { .. }
            ))
        ));
    }

    #[test]
    fn test_longer_valid_chain_replaces_shorter() {
        let wallet = Wallet::new().unwrap();
        let node_a = Consensus::new(Arc::new(Ledger::new()));
        let node_b = Consensus::new(Arc::new(Ledger::new()));
        let chain_a = build_chain(&wallet, 3, 1);
        let chain_b = build_chain(&wallet, 5, 1);
        assert!(node_a.accept_if_better(chain_a.clone()));
        assert!(node_b.accept_if_better(chain_b.clone()));

        assert!(node_a.accept_if_better(chain_b.clone()));
        assert_eq!(node_a.get_ledger().len(), 5);
        assert_eq!(*node_a.get_ledger().get_chain(), chain_b);

        assert!(!node_b.accept_if_better(chain_a));
        assert_eq!(*node_b.get_ledger().get_chain(), chain_b);
    }

    #[test]
    fn test_equal_length_chain_is_not_adopted() {
        let wallet = Wallet::new().unwrap();
        let engine = Consensus::new(Arc::new(Ledger::new()));
        let ours = build_chain(&wallet, 3, 1);
        let theirs = build_chain(&wallet, 3, 0);
        assert!(engine.accept_if_better(ours.clone()));

        assert!(!engine.accept_if_better(theirs));
        assert_eq!(*engine.get_ledger().get_chain(), ours);
    }

    #[test]
    fn test_longer_chain_without_work_is_not_adopted() {
        let wallet = Wallet::new().unwrap();
        let engine = engine_with_genesis();
        let mut candidate = build_chain(&wallet, 3, 0);
        let unmined = Block::new_candidate(3, candidate[2].get_hash(), vec![], 64).unwrap();
        candidate.push(unmined);

        assert!(Consensus::validate_chain(&candidate));
        assert!(!engine.accept_if_better(candidate));
        assert_eq!(engine.get_ledger().len(), 1);
    }

    #[test]
    fn test_concurrent_appends_never_fork_the_ledger() {
        let engine = Arc::new(engine_with_genesis());
        let genesis = engine.get_ledger().get_tip().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let genesis = genesis.clone();
                thread::spawn(move || {
                    let outcome = crate::core::proof_of_work::mine(
                        Block::new_candidate(1, genesis.get_hash(), vec![], 1).unwrap(),
                        MAX_MINING_ATTEMPTS,
                    );
                    engine.append_mined(outcome.into_block(), genesis.get_hash())
                })
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(engine.get_ledger().len(), 2);
        assert!(Consensus::validate_chain(&engine.get_ledger().get_chain()));
    }
}
