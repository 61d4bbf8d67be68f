use crate::core::Transaction;
use crate::error::{BlockchainError, Result};
use crate::utils::{sha256_digest, sha256_hex};
use data_encoding::HEXLOWER;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Root committed to by a block without transactions
pub static EMPTY_MERKLE_ROOT: Lazy<String> = Lazy::new(|| sha256_hex(b""));

/// Binary hash tree over a block's transactions.
///
/// Leaves are the transactions' content hashes. Each parent is the double
/// SHA-256 of its children concatenated; a node left without a sibling is
/// paired with itself, so a single leaf commits to `H(leaf || leaf)`.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    // levels[0] holds the leaves, the last level holds only the root
    levels: Vec<Vec<Vec<u8>>>,
}

/// Sibling path from one leaf up to the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_hash: Vec<u8>,
    pub merkle_root: Vec<u8>,
    pub proof_path: Vec<ProofElement>,
    pub leaf_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofElement {
    pub hash: Vec<u8>,
    /// true if the sibling sits to the right of the running hash
    pub is_right: bool,
}

impl MerkleTree {
    pub fn new(transactions: &[Transaction]) -> Result<Self> {
        let leaves = transactions
            .iter()
            .map(Transaction::content_hash)
            .collect::<Result<Vec<_>>>()?;
        Self::from_hashes(&leaves)
    }

    pub fn from_hashes(hashes: &[Vec<u8>]) -> Result<Self> {
        if hashes.is_empty() {
            return Err(BlockchainError::EmptyInput(
                "cannot build a Merkle tree from zero leaves".to_string(),
            ));
        }

        let mut levels = vec![hashes.to_vec()];
        loop {
            let current = &levels[levels.len() - 1];
            let next: Vec<Vec<u8>> = current
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    let right = pair.get(1).unwrap_or(left);
                    Self::hash_pair(left, right)
                })
                .collect();
            let done = next.len() == 1;
            levels.push(next);
            if done {
                break;
            }
        }

        Ok(MerkleTree { levels })
    }

    pub fn get_root_hash(&self) -> Vec<u8> {
        // from_hashes always pushes at least one level above the leaves
        self.levels
            .last()
            .and_then(|level| level.first())
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_root_hex(&self) -> String {
        HEXLOWER.encode(&self.get_root_hash())
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn leaves(&self) -> &[Vec<u8>] {
        self.levels[0].as_slice()
    }

    pub fn generate_proof(&self, leaf_index: usize) -> Result<MerkleProof> {
        if leaf_index >= self.leaf_count() {
            return Err(BlockchainError::EmptyInput(format!(
                "leaf index {} out of bounds ({} leaves)",
                leaf_index,
                self.leaf_count()
            )));
        }

        let mut proof_path = Vec::with_capacity(self.levels.len() - 1);
        let mut index = leaf_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let element = if index % 2 == 0 {
                let sibling = level.get(index + 1).unwrap_or(&level[index]);
                ProofElement {
                    hash: sibling.clone(),
                    is_right: true,
                }
            } else {
                ProofElement {
                    hash: level[index - 1].clone(),
                    is_right: false,
                }
            };
            proof_path.push(element);
            index /= 2;
        }

        Ok(MerkleProof {
            leaf_hash: self.levels[0][leaf_index].clone(),
            merkle_root: self.get_root_hash(),
            proof_path,
            leaf_index,
        })
    }

    /// Fold the sibling path onto the leaf and compare with the claimed root
    pub fn verify_proof(proof: &MerkleProof) -> bool {
        let computed = proof
            .proof_path
            .iter()
            .fold(proof.leaf_hash.clone(), |current, element| {
                if element.is_right {
                    Self::hash_pair(&current, &element.hash)
                } else {
                    Self::hash_pair(&element.hash, &current)
                }
            });
        computed == proof.merkle_root
    }

    fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
        let mut combined = Vec::with_capacity(left.len() + right.len());
        combined.extend_from_slice(left);
        combined.extend_from_slice(right);
        sha256_digest(&sha256_digest(&combined))
    }
}

/// Hex Merkle root over `transactions`; fails with `EmptyInput` for an empty list
pub fn build_root(transactions: &[Transaction]) -> Result<String> {
    Ok(MerkleTree::new(transactions)?.get_root_hex())
}

/// Root a block stores for its transaction list, substituting [`EMPTY_MERKLE_ROOT`]
pub fn commitment_for(transactions: &[Transaction]) -> Result<String> {
    match build_root(transactions) {
        Err(BlockchainError::EmptyInput(_)) => Ok(EMPTY_MERKLE_ROOT.clone()),
        other => other,
    }
}

/// Rebuild the tree over `transactions` and check that `target` is one of its
/// committed leaves with a proof that folds back to the root.
///
/// Leaves are content hashes, which leave the signature out. A member
/// transaction re-signed by the same key (fresh ECDSA nonce, same id) is
/// therefore reported as included; identity here is the transaction id.
pub fn verify_inclusion(transactions: &[Transaction], target: &Transaction) -> bool {
    let tree = match MerkleTree::new(transactions) {
        Ok(tree) => tree,
        Err(_) => return false,
    };
    let target_hash = match target.content_hash() {
        Ok(hash) => hash,
        Err(_) => return false,
    };

    match tree.leaves().iter().position(|leaf| *leaf == target_hash) {
        Some(index) => tree
            .generate_proof(index)
            .map(|proof| MerkleTree::verify_proof(&proof))
            .unwrap_or(false),
        None => false,
    }
}
