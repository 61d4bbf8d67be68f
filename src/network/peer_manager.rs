use crate::error::{BlockchainError, Result};
use crate::network::message::encode_package;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// One registered connection. Writers lock `writer` for a whole frame so
/// frames never interleave; `control` is a clone used only for shutdown.
struct PeerStream {
    writer: Mutex<TcpStream>,
    control: TcpStream,
}

impl PeerStream {
    fn shutdown(&self) {
        let _ = self.control.shutdown(Shutdown::Both);
    }
}

type SharedStream = Arc<PeerStream>;

/// Open peer streams and the connection limit
///
/// Each entry is the write side of a live connection, inbound or outbound.
/// Broadcasts clone the entries out of the map lock before writing, so a slow
/// peer never blocks registration or lookups.
pub struct PeerManager {
    peers: Arc<RwLock<HashMap<SocketAddr, SharedStream>>>,
    max_connections: usize,
}

impl PeerManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
            max_connections,
        }
    }

    /// Track `stream` as the connection to `address`, replacing an older one
    pub fn record_connection(&self, address: SocketAddr, stream: TcpStream) -> Result<()> {
        self.record_connection_with(address, stream, |_| Ok(()))
    }

    /// Track `stream` and run `first` on it before any broadcast can reach it.
    ///
    /// The stream is registered while its write lock is held, so a broadcast
    /// racing with registration is delivered right after whatever `first`
    /// writes. If `first` fails the peer is dropped again.
    pub fn record_connection_with<F>(
        &self,
        address: SocketAddr,
        stream: TcpStream,
        first: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut TcpStream) -> Result<()>,
    {
        let control = stream
            .try_clone()
            .map_err(|e| BlockchainError::Network(format!("Failed to clone stream: {e}")))?;
        let shared = Arc::new(PeerStream {
            writer: Mutex::new(stream),
            control,
        });
        let mut writer = shared.writer.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut peers = self.peers.write().map_err(|e| {
                BlockchainError::Network(format!("Failed to acquire peer lock: {e}"))
            })?;

            if !peers.contains_key(&address) && peers.len() >= self.max_connections {
                return Err(BlockchainError::Network(format!(
                    "Connection limit of {} peers reached, rejecting {address}",
                    self.max_connections
                )));
            }

            if let Some(old) = peers.insert(address, Arc::clone(&shared)) {
                old.shutdown();
            }
        }
        info!("Connected to peer: {address}");

        if let Err(e) = first(&mut *writer) {
            drop(writer);
            self.forget(address, &shared)?;
            return Err(e);
        }
        Ok(())
    }

    pub fn record_disconnection(&self, address: SocketAddr) -> Result<()> {
        let mut peers = self
            .peers
            .write()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;

        if let Some(stream) = peers.remove(&address) {
            stream.shutdown();
            info!("Disconnected from peer: {address}");
        }
        Ok(())
    }

    // Remove `address` only while it still maps to `stream`
    fn forget(&self, address: SocketAddr, stream: &SharedStream) -> Result<()> {
        let mut peers = self
            .peers
            .write()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;

        if peers
            .get(&address)
            .is_some_and(|current| Arc::ptr_eq(current, stream))
        {
            peers.remove(&address);
            info!("Disconnected from peer: {address}");
        }
        stream.shutdown();
        Ok(())
    }

    pub fn is_connected(&self, address: &SocketAddr) -> Result<bool> {
        let peers = self
            .peers
            .read()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;
        Ok(peers.contains_key(address))
    }

    pub fn get_connected_addresses(&self) -> Result<Vec<SocketAddr>> {
        let peers = self
            .peers
            .read()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;
        Ok(peers.keys().copied().collect())
    }

    pub fn get_connected_count(&self) -> Result<usize> {
        let peers = self
            .peers
            .read()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))?;
        Ok(peers.len())
    }

    pub fn should_accept_connection(&self) -> Result<bool> {
        Ok(self.get_connected_count()? < self.max_connections)
    }

    /// Write `package` to every open peer. Peers whose stream fails are dropped.
    /// Returns how many peers received it.
    pub fn broadcast<T: Serialize + ?Sized>(&self, package: &T) -> Result<usize> {
        let frame = encode_package(package)?;
        let targets: Vec<(SocketAddr, SharedStream)> = {
            let peers = self.peers.read().map_err(|e| {
                BlockchainError::Network(format!("Failed to acquire peer lock: {e}"))
            })?;
            peers
                .iter()
                .map(|(addr, stream)| (*addr, Arc::clone(stream)))
                .collect()
        };

        let mut delivered = 0;
        for (addr, stream) in targets {
            let sent = {
                let mut writer = stream.writer.lock().unwrap_or_else(PoisonError::into_inner);
                writer.write_all(&frame).and_then(|_| writer.flush())
            };
            match sent {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Dropping peer {addr}: {e}");
                    self.forget(addr, &stream)?;
                }
            }
        }
        Ok(delivered)
    }
}
