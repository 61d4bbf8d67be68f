// Canonical byte encoding used for content hashing
use crate::error::{BlockchainError, Result};

/// Encode data using bincode 2.0 with standard configuration.
///
/// Strings are length-prefixed, so concatenated fields cannot collide the way
/// plain string joins can.
pub fn encode_canonical<T: bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}
