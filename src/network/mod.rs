//! Peer-to-peer networking
//!
//! Chain sync between nodes over plain TCP streams, connection tracking and
//! seed-based peer discovery.

pub mod discovery;
pub mod message;
pub mod peer_manager;
pub mod server;
pub mod sync;

pub use discovery::{PeerFoundHandler, SeedDiscovery};
pub use message::{Greeting, Package, NODE_VERSION};
pub use peer_manager::PeerManager;
pub use server::{connect_with_retries, run_session, Direction, Server, SyncContext};
pub use sync::{announce, receive, ChainSink, SyncReport};
