//! # powchain
//!
//! Core of a single-writer proof-of-work blockchain node: signed value
//! transfers, merkle-committed blocks, a memory pool of pending transfers,
//! an in-memory ledger guarded by a consensus engine, and a newline-delimited
//! JSON sync protocol over TCP that adopts the longest valid chain.
//!
//! ## Layout
//! - `core/`: transactions, merkle trees, blocks, proof-of-work, ledger, consensus, miner
//! - `storage/`: the memory pool
//! - `network/`: wire messages, chain sync, peer tracking, discovery, TCP server
//! - `node/`: wires one ledger, pool and identity into a running node
//! - `wallet/`: signing identity and address derivation
//! - `config/`: node settings from TOML, environment and flags
//! - `utils/`: hashing, signatures and canonical encoding
//! - `cli/`: command-line parsing

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod node;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

pub use cli::{Command, Opt};
pub use config::{Settings, MAX_DIFFICULTY};
pub use core::{
    build_root, mine, verify_inclusion, Block, Consensus, Ledger, MerkleProof, MerkleTree, Miner,
    MiningOutcome, ProofElement, ProofOfWork, Transaction, EMPTY_MERKLE_ROOT, MAX_MINING_ATTEMPTS,
};
pub use error::{BlockViolation, BlockchainError, Result, TransactionViolation};
pub use network::{ChainSink, Greeting, Package, PeerManager, SeedDiscovery, Server, SyncContext};
pub use node::Node;
pub use storage::MemoryPool;
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest, sha256_hex,
};
pub use wallet::{
    convert_address, derive_address, hash_pub_key, validate_address, Signer, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
