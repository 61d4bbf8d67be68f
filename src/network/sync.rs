//! Peer chain sync over any ordered byte stream
//!
//! Each side of a connection announces itself with a [`Greeting`] and then
//! writes its full chain. The receiving side reads values in a loop: greetings
//! are logged, chains are offered to a [`ChainSink`], and the first value that
//! decodes as neither ends the session. Nothing here touches the ledger lock
//! while blocked on I/O; the sink is only called with a fully decoded chain.

use crate::core::{Block, Consensus};
use crate::error::Result;
use crate::network::message::{send_chain, send_greeting, Greeting, Package};
use log::{debug, info, warn};
use serde_json::error::Category;
use serde_json::Deserializer;
use std::io::{BufReader, Read, Write};

/// Whatever decides on a chain a peer offered
pub trait ChainSink: Send + Sync {
    /// Returns true if the chain was adopted
    fn offer_chain(&self, chain: Vec<Block>) -> bool;
}

impl ChainSink for Consensus {
    fn offer_chain(&self, chain: Vec<Block>) -> bool {
        self.accept_if_better(chain)
    }
}

/// What one inbound session amounted to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub greeting: Option<Greeting>,
    pub chains_received: usize,
    pub chains_adopted: usize,
}

/// Sender half: greeting and then the whole chain
pub fn announce<W: Write>(writer: &mut W, node_id: &str, chain: &[Block]) -> Result<()> {
    send_greeting(writer, &Greeting::new(node_id, chain.len()))?;
    send_chain(writer, chain)
}

/// Receiver half: consume values until the stream closes or a value fails to
/// decode. Decode and I/O failures are not errors for the caller, they only
/// end the session.
pub fn receive<R: Read>(reader: R, peer: &str, sink: &dyn ChainSink) -> SyncReport {
    let mut report = SyncReport::default();
    let packages = Deserializer::from_reader(BufReader::new(reader)).into_iter::<Package>();

    for package in packages {
        match package {
            Ok(Package::Greeting(greeting)) => {
                info!(
                    "Greeting from {peer}: node {} (version {}, chain length {})",
                    greeting.node_id, greeting.version, greeting.chain_length
                );
                report.greeting = Some(greeting);
            }
            Ok(Package::Chain(chain)) => {
                report.chains_received += 1;
                let length = chain.len();
                if sink.offer_chain(chain) {
                    report.chains_adopted += 1;
                    info!("Adopted chain of {length} blocks from {peer}");
                } else {
                    debug!("Kept local chain over {length} blocks from {peer}");
                }
            }
            Err(e) => {
                match e.classify() {
                    Category::Eof => debug!("Peer {peer} closed the stream"),
                    Category::Io => debug!("Stream from {peer} ended: {e}"),
                    Category::Syntax | Category::Data => {
                        warn!("Closing stream from {peer}: not a chain-sync message ({e})")
                    }
                }
                break;
            }
        }
    }
    report
}
