//! Test utilities for ledger testing

use crate::core::proof_of_work::{mine, MAX_MINING_ATTEMPTS};
use crate::core::{Block, Transaction};
use crate::wallet::{Signer, Wallet};

/// 2023-11-14T22:13:20Z in milliseconds; keeps transaction ids reproducible
pub const FIXED_TIMESTAMP: i64 = 1_700_000_000_000;

pub fn signed_tx_at(wallet: &Wallet, receiver: &str, amount: f64, timestamp: i64) -> Transaction {
    wallet
        .sign(Transaction::new(receiver, amount, 0.0, timestamp))
        .expect("signing a test transaction")
}

/// Transaction from `wallet` stamped with [`FIXED_TIMESTAMP`]
pub fn signed_tx(wallet: &Wallet, receiver: &str, amount: f64) -> Transaction {
    signed_tx_at(wallet, receiver, amount, FIXED_TIMESTAMP)
}

/// Mine a block carrying `transactions` on top of `previous`
pub fn mine_on(previous: &Block, transactions: Vec<Transaction>, difficulty: u32) -> Block {
    let index = previous.get_index() + 1;
    let candidate = Block::new_candidate_at(
        index,
        FIXED_TIMESTAMP + index as i64,
        previous.get_hash(),
        transactions,
        difficulty,
    )
    .expect("building a test block");
    let outcome = mine(candidate, MAX_MINING_ATTEMPTS);
    assert!(outcome.is_solved(), "test block should be minable");
    outcome.into_block()
}

/// Genesis followed by `length - 1` mined blocks, each carrying one distinct transfer
pub fn build_chain(wallet: &Wallet, length: usize, difficulty: u32) -> Vec<Block> {
    let mut chain = vec![Block::genesis()];
    while chain.len() < length {
        let amount = chain.len() as f64;
        let tx = signed_tx(wallet, "bob", amount);
        let block = mine_on(&chain[chain.len() - 1], vec![tx], difficulty);
        chain.push(block);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Consensus;

    #[test]
    fn test_build_chain_is_valid() {
        let wallet = Wallet::new().unwrap();
        let chain = build_chain(&wallet, 4, 1);
        assert_eq!(chain.len(), 4);
        assert!(Consensus::validate_chain(&chain));
        assert!(chain.iter().all(Consensus::validate_proof_of_work));
    }

    #[test]
    fn test_signed_tx_is_reproducible() {
        let wallet = Wallet::new().unwrap();
        assert_eq!(
            signed_tx(&wallet, "bob", 1.0).get_id(),
            signed_tx(&wallet, "bob", 1.0).get_id()
        );
    }
}
