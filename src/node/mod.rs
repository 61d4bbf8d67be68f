//! Node wiring
//!
//! One [`Node`] owns exactly one ledger, one memory pool, one consensus engine
//! and one signing identity, and hands shared references to the miner, the
//! server and the discovery thread. Its methods are the entry points an
//! outer API layer would call.

use crate::config::Settings;
use crate::core::{Block, Consensus, Ledger, Miner, Transaction};
use crate::error::Result;
use crate::network::{
    connect_with_retries, run_session, ChainSink, Direction, PeerFoundHandler, PeerManager,
    SeedDiscovery, Server, SyncContext,
};
use crate::storage::MemoryPool;
use crate::wallet::Signer;
use log::{error, info, warn};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Adopts peer chains and drops pending transactions the new chain already holds
struct ChainAdopter {
    consensus: Arc<Consensus>,
    mempool: Arc<MemoryPool>,
}

impl ChainSink for ChainAdopter {
    fn offer_chain(&self, chain: Vec<Block>) -> bool {
        if !self.consensus.accept_if_better(chain) {
            return false;
        }
        let adopted = self.consensus.get_ledger().get_chain();
        let mined: Vec<Transaction> = adopted
            .iter()
            .flat_map(|block| block.get_transactions().iter().cloned())
            .collect();
        let evicted = self.mempool.evict_mined(&mined);
        if evicted > 0 {
            info!("Evicted {evicted} pending transactions included in adopted chain");
        }
        true
    }
}

#[derive(Clone)]
pub struct Node {
    settings: Arc<Settings>,
    consensus: Arc<Consensus>,
    mempool: Arc<MemoryPool>,
    miner: Arc<Miner>,
    signer: Arc<dyn Signer>,
    peer_manager: Arc<PeerManager>,
    adopter: Arc<ChainAdopter>,
    shutdown: Arc<AtomicBool>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl Node {
    /// Build a node whose ledger holds only the genesis block
    pub fn new(settings: Settings, signer: Arc<dyn Signer>) -> Result<Node> {
        settings.validate()?;

        let ledger = Arc::new(Ledger::new());
        let consensus = Arc::new(Consensus::new(ledger));
        consensus.append_block(Block::genesis())?;

        let mempool = Arc::new(MemoryPool::new());
        let miner = Arc::new(Miner::new(
            Arc::clone(&consensus),
            Arc::clone(&mempool),
            settings.difficulty,
            settings.max_mining_attempts,
        ));
        let adopter = Arc::new(ChainAdopter {
            consensus: Arc::clone(&consensus),
            mempool: Arc::clone(&mempool),
        });

        Ok(Node {
            peer_manager: Arc::new(PeerManager::new(settings.max_peers)),
            settings: Arc::new(settings),
            consensus,
            mempool,
            miner,
            signer,
            adopter,
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Arc::new(Mutex::new(Vec::new())),
            local_addr: Arc::new(Mutex::new(None)),
        })
    }

    pub fn get_settings(&self) -> &Settings {
        &self.settings
    }

    pub fn get_node_id(&self) -> &str {
        &self.settings.node_id
    }

    pub fn get_address(&self) -> String {
        self.signer.address()
    }

    pub fn get_ledger(&self) -> &Arc<Ledger> {
        self.consensus.get_ledger()
    }

    pub fn get_mempool(&self) -> &Arc<MemoryPool> {
        &self.mempool
    }

    pub fn get_peer_manager(&self) -> &Arc<PeerManager> {
        &self.peer_manager
    }

    pub fn get_chain(&self) -> Arc<Vec<Block>> {
        self.get_ledger().get_chain()
    }

    /// Address the server is bound to, once started
    pub fn get_local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and queue a transaction
    pub fn submit_transaction(&self, transaction: Transaction) -> Result<()> {
        self.mempool.submit(transaction)
    }

    /// Sign a new transfer from this node's identity and queue it
    pub fn create_transaction(&self, receiver: &str, amount: f64, fee: f64) -> Result<Transaction> {
        let transaction = self
            .signer
            .sign(Transaction::new_now(receiver, amount, fee)?)?;
        self.submit_transaction(transaction.clone())?;
        Ok(transaction)
    }

    /// Mine pending transactions into a block and broadcast the new chain
    pub fn mine(&self) -> Result<Option<Block>> {
        let block = self.miner.mine_pending()?;
        if block.is_some() {
            self.broadcast_chain()?;
        }
        Ok(block)
    }

    /// Append an externally built block and drop its transactions from the pool
    pub fn append_block(&self, block: Block) -> Result<()> {
        let transactions = block.get_transactions().to_vec();
        self.consensus.append_block(block)?;
        self.mempool.evict_mined(&transactions);
        Ok(())
    }

    /// Fork choice on a chain received out of band
    pub fn accept_chain(&self, chain: Vec<Block>) -> bool {
        self.adopter.offer_chain(chain)
    }

    /// Write the current chain to every connected peer
    pub fn broadcast_chain(&self) -> Result<usize> {
        let chain = self.get_chain();
        let delivered = self.peer_manager.broadcast(chain.as_slice())?;
        info!(
            "Broadcast chain of {} blocks to {delivered} peers",
            chain.len()
        );
        Ok(delivered)
    }

    fn sync_context(&self) -> SyncContext {
        SyncContext {
            node_id: self.settings.node_id.clone(),
            ledger: Arc::clone(self.get_ledger()),
            sink: self.adopter.clone(),
            peer_manager: Arc::clone(&self.peer_manager),
            io_timeout: self.settings.connect_timeout(),
            idle_timeout: self.settings.idle_timeout(),
        }
    }

    /// Connect to `peer`, exchange chains and keep the stream open for later syncs.
    /// Blocks for as long as the session lasts.
    pub fn connect_to_peer(&self, peer: SocketAddr) -> Result<()> {
        let stream = connect_with_retries(
            peer,
            self.settings.connect_timeout(),
            self.settings.connect_retries,
        )?;
        let report = run_session(&self.sync_context(), stream, peer, Direction::Outbound)?;
        info!(
            "Session with {peer} ended: {} chains received, {} adopted",
            report.chains_received, report.chains_adopted
        );
        Ok(())
    }

    /// Bind the listener and spawn the server, the periodic miner (if enabled),
    /// seed discovery and memory-pool maintenance. Returns the bound address.
    pub fn start(&self) -> Result<SocketAddr> {
        let listener = Server::bind(self.settings.socket_addr()?)?;
        let local = listener.local_addr()?;
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = Some(local);
        info!(
            "Node {} starting on {local} with address {}",
            self.settings.node_id,
            self.get_address()
        );

        let server = Server::new(self.sync_context());
        let shutdown = Arc::clone(&self.shutdown);
        self.spawn_worker(move || {
            if let Err(e) = server.run(listener, shutdown) {
                error!("Server error: {e}");
            }
        });

        if let Some(interval) = self.settings.mining_interval() {
            let node = self.clone();
            self.spawn_worker(move || node.mining_loop(interval));
        }

        let node = self.clone();
        self.spawn_worker(move || node.maintenance_loop());

        if !self.settings.seeds.is_empty() {
            let discovery = SeedDiscovery::new(self.settings.seeds.clone(), local.port())
                .with_interval(self.settings.discovery_interval());
            let handle = discovery.spawn(Arc::new(self.clone()), local, Arc::clone(&self.shutdown));
            self.workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handle);
        }

        Ok(local)
    }

    fn spawn_worker<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::spawn(work);
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    fn mining_loop(&self, interval: Duration) {
        info!("Periodic mining every {}s", interval.as_secs());
        while self.sleep_unless_shutdown(interval) {
            match self.mine() {
                Ok(Some(block)) => info!("Periodic miner produced block {}", block.get_index()),
                Ok(None) => {}
                Err(e) => warn!("Mining round failed: {e}"),
            }
        }
    }

    fn maintenance_loop(&self) {
        while self.sleep_unless_shutdown(MAINTENANCE_INTERVAL) {
            if let Err(e) = self.mempool.evict_expired(self.settings.mempool_max_age()) {
                warn!("Failed to evict expired transactions: {e}");
            }
        }
    }

    // false once shutdown was requested
    fn sleep_unless_shutdown(&self, duration: Duration) -> bool {
        let mut waited = Duration::ZERO;
        while waited < duration {
            if self.shutdown.load(Ordering::SeqCst) {
                return false;
            }
            let step = SHUTDOWN_POLL.min(duration - waited);
            thread::sleep(step);
            waited += step;
        }
        !self.shutdown.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stop background work and wait for it to finish. Open peer sessions end
    /// when their peers disconnect or go idle.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Node {} shutting down", self.settings.node_id);
        // Wake the blocking accept loop
        if let Some(local) = self.get_local_addr() {
            let _ = TcpStream::connect_timeout(&local, self.settings.connect_timeout());
        }
        for addr in self.peer_manager.get_connected_addresses().unwrap_or_default() {
            let _ = self.peer_manager.record_disconnection(addr);
        }
        self.wait();
    }

    /// Block until every background thread has exited
    pub fn wait(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("Background worker panicked");
            }
        }
    }
}

impl PeerFoundHandler for Node {
    /// Sync with a newly found peer on its own thread
    fn on_peer_found(&self, peer: SocketAddr) {
        if self.is_shutting_down() || self.get_local_addr() == Some(peer) {
            return;
        }
        if self.peer_manager.is_connected(&peer).unwrap_or(false) {
            return;
        }
        if !self.peer_manager.should_accept_connection().unwrap_or(false) {
            warn!("Skipping peer {peer}: connection limit reached");
            return;
        }

        let node = self.clone();
        thread::spawn(move || {
            if let Err(e) = node.connect_to_peer(peer) {
                warn!("Skipping peer {peer}: {e}");
            }
        });
    }
}
