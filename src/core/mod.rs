//! Core chain functionality
//!
//! Signed transactions, merkle commitments, blocks and proof-of-work, the
//! in-memory ledger and the consensus engine that guards it.

pub mod block;
pub mod consensus;
pub mod ledger;
pub mod merkle;
pub mod miner;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use consensus::Consensus;
pub use ledger::Ledger;
pub use merkle::{
    build_root, verify_inclusion, MerkleProof, MerkleTree, ProofElement, EMPTY_MERKLE_ROOT,
};
pub use miner::Miner;
pub use proof_of_work::{mine, MiningOutcome, ProofOfWork, MAX_MINING_ATTEMPTS};
pub use transaction::Transaction;
