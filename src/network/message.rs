// Peer sync payloads. Each value is one line of JSON on the stream.

use crate::core::Block;
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

pub const NODE_VERSION: u32 = 1;

/// First value a peer writes after connecting; only logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Greeting {
    pub node_id: String,
    pub version: u32,
    pub chain_length: usize,
}

impl Greeting {
    pub fn new(node_id: &str, chain_length: usize) -> Greeting {
        Greeting {
            node_id: node_id.to_string(),
            version: NODE_VERSION,
            chain_length,
        }
    }
}

/// Anything the receiver accepts. A greeting is a JSON object and a chain is
/// a JSON array of blocks, so the shape alone tells them apart; a value that
/// is neither fails to decode and ends the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Package {
    Greeting(Greeting),
    Chain(Vec<Block>),
}

/// One JSON value followed by a newline
pub fn encode_package<T: Serialize + ?Sized>(package: &T) -> Result<Vec<u8>> {
    let mut frame = serde_json::to_vec(package)
        .map_err(|e| BlockchainError::Serialization(format!("Failed to encode package: {e}")))?;
    frame.push(b'\n');
    Ok(frame)
}

/// Write a whole frame with a single `write_all`, then flush. Writers shared
/// between threads must still be locked around the call.
pub fn send_package<W: Write, T: Serialize + ?Sized>(writer: &mut W, package: &T) -> Result<()> {
    let frame = encode_package(package)?;
    writer
        .write_all(&frame)
        .and_then(|_| writer.flush())
        .map_err(|e| BlockchainError::Network(format!("Failed to send data: {e}")))
}

pub fn send_greeting<W: Write>(writer: &mut W, greeting: &Greeting) -> Result<()> {
    send_package(writer, greeting)
}

pub fn send_chain<W: Write>(writer: &mut W, chain: &[Block]) -> Result<()> {
    send_package(writer, chain)
}
