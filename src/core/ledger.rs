// The ordered chain of accepted blocks.
// Readers get an immutable snapshot; writers go through the consensus engine,
// which holds the write guard across its whole validate-then-mutate sequence.

use crate::core::Block;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

/// Shared chain guarded by one reader-writer lock
#[derive(Debug, Default)]
pub struct Ledger {
    // Mutation replaces or extends the Arc'd vector in one step, so a poisoned
    // lock still guards a consistent chain.
    chain: RwLock<Arc<Vec<Block>>>,
}

impl Ledger {
    /// An empty ledger; the first block appended must be a genesis block
    pub fn new() -> Ledger {
        Ledger {
            chain: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// A ledger seeded with [`Block::genesis`]
    pub fn with_genesis() -> Ledger {
        Ledger {
            chain: RwLock::new(Arc::new(vec![Block::genesis()])),
        }
    }

    /// Snapshot of the whole chain. Later appends or replacements do not affect it.
    pub fn get_chain(&self) -> Arc<Vec<Block>> {
        let chain = self.chain.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&chain)
    }

    pub fn get_tip(&self) -> Option<Block> {
        let chain = self.chain.read().unwrap_or_else(PoisonError::into_inner);
        chain.last().cloned()
    }

    pub fn get_tip_hash(&self) -> Option<String> {
        let chain = self.chain.read().unwrap_or_else(PoisonError::into_inner);
        chain.last().map(|block| block.get_hash().to_string())
    }

    pub fn len(&self) -> usize {
        let chain = self.chain.read().unwrap_or_else(PoisonError::into_inner);
        chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_transaction(&self, txid: &str) -> bool {
        self.get_chain()
            .iter()
            .flat_map(|block| block.get_transactions())
            .any(|tx| tx.get_id() == txid)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Arc<Vec<Block>>> {
        self.chain.write().unwrap_or_else(PoisonError::into_inner)
    }
}
