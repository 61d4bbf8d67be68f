use crate::error::{BlockchainError, Result};
use log::{info, warn};
use std::collections::HashSet;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Notified by a discovery mechanism whenever it learns about a peer.
///
/// Implementations must return quickly and hand long-running work (connecting,
/// syncing) to their own thread.
pub trait PeerFoundHandler: Send + Sync {
    fn on_peer_found(&self, peer: SocketAddr);
}

/// Seed discovery
///
/// Resolves a configured list of `host[:port]` seeds and reports every address
/// they yield. Seeds without a port use the network's default port.
pub struct SeedDiscovery {
    seeds: Vec<String>,
    default_port: u16,
    interval: Duration,
}

impl SeedDiscovery {
    pub fn new(seeds: Vec<String>, default_port: u16) -> Self {
        Self {
            seeds,
            default_port,
            interval: Duration::from_secs(300),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn get_seeds(&self) -> &[String] {
        &self.seeds
    }

    fn resolve_seed(&self, seed: &str) -> Result<Vec<SocketAddr>> {
        let target = if seed.contains(':') {
            seed.to_string()
        } else {
            format!("{}:{}", seed, self.default_port)
        };

        target
            .to_socket_addrs()
            .map(|addresses| addresses.collect())
            .map_err(|e| BlockchainError::Network(format!("Resolution failed for '{seed}': {e}")))
    }

    /// Resolve every seed, skipping the ones that fail
    pub fn discover_peers(&self) -> Vec<SocketAddr> {
        let mut seen = HashSet::new();
        let mut peers = Vec::new();
        for seed in &self.seeds {
            match self.resolve_seed(seed) {
                Ok(addresses) => {
                    for addr in addresses {
                        if seen.insert(addr) {
                            peers.push(addr);
                        }
                    }
                }
                Err(e) => warn!("Failed to resolve seed '{seed}': {e}"),
            }
        }
        peers
    }

    /// One discovery round; `local` is never reported
    pub fn run_once(&self, handler: &dyn PeerFoundHandler, local: SocketAddr) -> usize {
        let peers: Vec<SocketAddr> = self
            .discover_peers()
            .into_iter()
            .filter(|addr| *addr != local)
            .collect();
        info!(
            "Seed discovery found {} peers from {} seeds",
            peers.len(),
            self.seeds.len()
        );
        for peer in &peers {
            handler.on_peer_found(*peer);
        }
        peers.len()
    }

    /// Run discovery now and then every interval until `shutdown` is set.
    /// A zero interval runs a single round.
    pub fn spawn(
        self,
        handler: Arc<dyn PeerFoundHandler>,
        local: SocketAddr,
        shutdown: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            if self.interval.is_zero() {
                self.run_once(handler.as_ref(), local);
                return;
            }
            let tick = Duration::from_millis(200).min(self.interval);
            while !shutdown.load(Ordering::SeqCst) {
                self.run_once(handler.as_ref(), local);

                let mut waited = Duration::ZERO;
                while waited < self.interval && !shutdown.load(Ordering::SeqCst) {
                    thread::sleep(tick);
                    waited += tick;
                }
            }
        })
    }
}
