use crate::core::merkle::commitment_for;
use crate::core::Transaction;
use crate::error::Result;
use crate::utils::{current_timestamp, sha256_hex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub(crate) index: u64,
    pub(crate) timestamp: i64,
    pub(crate) transactions: Vec<Transaction>,
    pub(crate) previous_hash: String,
    pub(crate) hash: String,
    pub(crate) nonce: u64,
    pub(crate) merkle_root: String,
    pub(crate) difficulty: u32,
}

impl Block {
    /// Unmined block on top of `previous_hash`, stamped with the current time.
    /// The stored hash is the one for nonce 0.
    pub fn new_candidate(
        index: u64,
        previous_hash: &str,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Result<Block> {
        Self::new_candidate_at(
            index,
            current_timestamp()?,
            previous_hash,
            transactions,
            difficulty,
        )
    }

    pub fn new_candidate_at(
        index: u64,
        timestamp: i64,
        previous_hash: &str,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Result<Block> {
        let merkle_root = commitment_for(&transactions)?;
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash: previous_hash.to_string(),
            hash: String::new(),
            nonce: 0,
            merkle_root,
            difficulty,
        };
        block.hash = block.calculate_hash();
        Ok(block)
    }

    /// The block every node starts from. All fields are fixed, so independently
    /// started nodes agree on it.
    pub fn genesis() -> Block {
        let mut block = Block {
            index: 0,
            timestamp: 0,
            transactions: vec![],
            previous_hash: String::new(),
            hash: String::new(),
            nonce: 0,
            merkle_root: crate::core::merkle::EMPTY_MERKLE_ROOT.clone(),
            difficulty: 0,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Header bytes hashed for a given nonce
    pub(crate) fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.index.to_be_bytes());
        data_bytes.extend(self.timestamp.to_be_bytes());
        data_bytes.extend(self.previous_hash.as_bytes());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes.extend(self.merkle_root.as_bytes());
        data_bytes.extend(self.difficulty.to_be_bytes());
        data_bytes
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        sha256_hex(&self.prepare_data(nonce))
    }

    pub fn calculate_hash(&self) -> String {
        self.hash_with_nonce(self.nonce)
    }

    /// `hash` starts with `difficulty` zero hex digits
    pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
        let difficulty = difficulty as usize;
        difficulty <= hash.len() && hash.bytes().take(difficulty).all(|b| b == b'0')
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    pub fn verify_merkle_root(&self) -> bool {
        match commitment_for(&self.transactions) {
            Ok(root) => root == self.merkle_root,
            Err(_) => false,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash.is_empty()
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_merkle_root(&self) -> &str {
        self.merkle_root.as_str()
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::merkle::{build_root, EMPTY_MERKLE_ROOT};
    use crate::testnet::test_utils::{signed_tx, FIXED_TIMESTAMP};
    use crate::wallet::Wallet;

    #[test]
    fn test_genesis_is_identical_everywhere() {
        let a = Block::genesis();
        let b = Block::genesis();
        assert_eq!(a, b);
        assert!(a.is_genesis());
        assert!(a.has_valid_hash());
        assert_eq!(a.get_merkle_root(), EMPTY_MERKLE_ROOT.as_str());
    }

    #[test]
    fn test_candidate_commits_to_its_transactions() {
        let alice = Wallet::new().unwrap();
        let txs = vec![
            signed_tx(&alice, "bob", 10.0),
            signed_tx(&alice, "charlie", 5.0),
        ];
        let root = build_root(&txs).unwrap();

        let block = Block::new_candidate_at(1, FIXED_TIMESTAMP, "abc", txs, 1).unwrap();
        assert_eq!(block.get_merkle_root(), root);
        assert!(block.verify_merkle_root());
        assert!(block.has_valid_hash());
        assert_eq!(block.get_nonce(), 0);
    }

    #[test]
    fn test_hash_covers_every_header_field() {
        let base = Block::new_candidate_at(3, FIXED_TIMESTAMP, "prev", vec![], 2).unwrap();
        let original = base.calculate_hash();

        let mut changed = base.clone();
        changed.index = 4;
        assert_ne!(changed.calculate_hash(), original);

        let mut changed = base.clone();
        changed.timestamp += 1;
        assert_ne!(changed.calculate_hash(), original);

        let mut changed = base.clone();
        changed.previous_hash = "other".to_string();
        assert_ne!(changed.calculate_hash(), original);

        let mut changed = base.clone();
        changed.merkle_root = "00".to_string();
        assert_ne!(changed.calculate_hash(), original);

        let mut changed = base.clone();
        changed.difficulty = 3;
        assert_ne!(changed.calculate_hash(), original);

        assert_ne!(base.hash_with_nonce(1), original);
    }

    #[test]
    fn test_meets_difficulty_counts_hex_zeros() {
        assert!(Block::meets_difficulty("00ab", 2));
        assert!(!Block::meets_difficulty("0a0b", 2));
        assert!(Block::meets_difficulty("ffff", 0));
        assert!(!Block::meets_difficulty("00", 3));
    }

    #[test]
    fn test_tampered_transaction_breaks_merkle_root() {
        let alice = Wallet::new().unwrap();
        let mut block = Block::new_candidate_at(
            1,
            FIXED_TIMESTAMP,
            "prev",
            vec![signed_tx(&alice, "bob", 10.0)],
            0,
        )
        .unwrap();
        block.transactions[0].amount = 11.0;
        assert!(!block.verify_merkle_root());
    }
}
