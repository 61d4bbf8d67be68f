//! Error handling for the ledger engine
//!
//! Every failure in the engine is recoverable: validation problems come back as
//! structured values so the caller can reject the offending transaction, block or
//! chain and carry on.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// The specific rule a transaction broke
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionViolation {
    /// Amount is zero, negative or not a finite number
    NonPositiveAmount(f64),
    /// Stored id differs from the recomputed content hash
    IdMismatch { expected: String, actual: String },
    /// Public key cannot be used for verification
    MalformedPublicKey,
    /// Signature does not verify under the sender's public key
    BadSignature,
    /// Sender address is not derived from the sender's public key
    AddressMismatch { derived: String, claimed: String },
}

impl fmt::Display for TransactionViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionViolation::NonPositiveAmount(amount) => {
                write!(f, "amount must be positive, got {amount}")
            }
            TransactionViolation::IdMismatch { expected, actual } => {
                write!(f, "id {actual} does not match content hash {expected}")
            }
            TransactionViolation::MalformedPublicKey => write!(f, "malformed sender public key"),
            TransactionViolation::BadSignature => write!(f, "signature verification failed"),
            TransactionViolation::AddressMismatch { derived, claimed } => {
                write!(f, "sender address {claimed} does not match derived {derived}")
            }
        }
    }
}

/// The specific invariant a block (or a chain of blocks) broke
#[derive(Debug, Clone, PartialEq)]
pub enum BlockViolation {
    /// A chain with no blocks
    EmptyChain,
    /// First block of an empty ledger or chain is not index 0
    NotGenesis { index: u64 },
    /// Genesis block carries a previous hash
    GenesisPreviousHash { previous_hash: String },
    IndexMismatch { expected: u64, actual: u64 },
    PreviousHashMismatch { expected: String, actual: String },
    /// Stored hash differs from the recomputed content hash
    HashMismatch { index: u64, expected: String, actual: String },
    MerkleRootMismatch { index: u64 },
    /// Hash lacks the declared number of leading zero hex digits
    InsufficientWork { index: u64, difficulty: u32 },
    InvalidTransaction { index: u64, id: String },
    DuplicateTransaction { id: String },
    /// Candidate chain is not strictly longer than the local one
    ChainNotLonger { current: usize, candidate: usize },
}

impl fmt::Display for BlockViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockViolation::EmptyChain => write!(f, "chain is empty"),
            BlockViolation::NotGenesis { index } => {
                write!(f, "expected genesis block at index 0, got index {index}")
            }
            BlockViolation::GenesisPreviousHash { previous_hash } => write!(
                f,
                "genesis block must have an empty previous hash, got {previous_hash}"
            ),
            BlockViolation::IndexMismatch { expected, actual } => {
                write!(f, "invalid block index: got {actual}, want {expected}")
            }
            BlockViolation::PreviousHashMismatch { expected, actual } => {
                write!(f, "invalid previous hash: got {actual}, want {expected}")
            }
            BlockViolation::HashMismatch {
                index,
                expected,
                actual,
            } => write!(
                f,
                "block {index} hash {actual} does not match recomputed {expected}"
            ),
            BlockViolation::MerkleRootMismatch { index } => {
                write!(f, "block {index} merkle root does not match its transactions")
            }
            BlockViolation::InsufficientWork { index, difficulty } => write!(
                f,
                "block {index} hash lacks {difficulty} leading zero hex digits"
            ),
            BlockViolation::InvalidTransaction { index, id } => {
                write!(f, "block {index} contains invalid transaction {id}")
            }
            BlockViolation::DuplicateTransaction { id } => {
                write!(f, "transaction {id} appears more than once")
            }
            BlockViolation::ChainNotLonger { current, candidate } => write!(
                f,
                "candidate chain of {candidate} blocks is not longer than local chain of {current}"
            ),
        }
    }
}

/// Error types for ledger operations
#[derive(Debug, Clone)]
pub enum BlockchainError {
    /// Transaction rejected by validation
    InvalidTransaction(TransactionViolation),
    /// Block or chain rejected by validation
    InvalidBlock(BlockViolation),
    /// Merkle commitment requested over zero transactions
    EmptyInput(String),
    /// Ledger tip moved between mining and append
    StaleTip { expected: String, actual: String },
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Invalid address format
    InvalidAddress(String),
    /// Mining errors
    Mining(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::InvalidTransaction(v) => write!(f, "Invalid transaction: {v}"),
            BlockchainError::InvalidBlock(v) => write!(f, "Invalid block: {v}"),
            BlockchainError::EmptyInput(msg) => write!(f, "Empty input: {msg}"),
            BlockchainError::StaleTip { expected, actual } => {
                write!(f, "Stale tip: mined on {expected}, ledger tip is now {actual}")
            }
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::Mining(msg) => write!(f, "Mining error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<TransactionViolation> for BlockchainError {
    fn from(v: TransactionViolation) -> Self {
        BlockchainError::InvalidTransaction(v)
    }
}

impl From<BlockViolation> for BlockchainError {
    fn from(v: BlockViolation) -> Self {
        BlockchainError::InvalidBlock(v)
    }
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}
