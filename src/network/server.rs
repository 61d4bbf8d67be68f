use crate::core::Ledger;
use crate::error::{BlockchainError, Result};
use crate::network::sync::{announce, receive, ChainSink, SyncReport};
use crate::network::PeerManager;
use log::{error, info, warn};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Everything one peer session needs, shared by inbound and outbound connections
#[derive(Clone)]
pub struct SyncContext {
    pub node_id: String,
    pub ledger: Arc<Ledger>,
    pub sink: Arc<dyn ChainSink>,
    pub peer_manager: Arc<PeerManager>,
    /// Write timeout on every peer stream
    pub io_timeout: Duration,
    /// Read timeout on inbound streams while waiting for the next value
    pub idle_timeout: Duration,
}

/// Which side opened the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Accepted by our server; closed after `idle_timeout` without traffic
    Inbound,
    /// Dialed by us; stays open until the peer or shutdown closes it
    Outbound,
}

fn configure_stream(stream: &TcpStream, ctx: &SyncContext, direction: Direction) -> Result<()> {
    stream
        .set_write_timeout(Some(ctx.io_timeout))
        .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;
    let read_timeout = match direction {
        Direction::Inbound => Some(ctx.idle_timeout),
        Direction::Outbound => None,
    };
    stream
        .set_read_timeout(read_timeout)
        .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))
}

/// Run one peer session on `stream` until the peer goes away.
///
/// Registers the stream for broadcasts, announces our chain on it and then
/// reads whatever the peer sends. The announcement is written under the
/// stream's write lock, so it always precedes any broadcast. The connection
/// is unregistered on the way out.
pub fn run_session(
    ctx: &SyncContext,
    stream: TcpStream,
    peer_addr: SocketAddr,
    direction: Direction,
) -> Result<SyncReport> {
    configure_stream(&stream, ctx, direction)?;

    let writer = stream
        .try_clone()
        .map_err(|e| BlockchainError::Network(format!("Failed to clone stream: {e}")))?;
    ctx.peer_manager
        .record_connection_with(peer_addr, writer, |writer| {
            let chain = ctx.ledger.get_chain();
            announce(writer, &ctx.node_id, &chain)
        })?;

    let report = receive(&stream, &peer_addr.to_string(), ctx.sink.as_ref());

    if let Err(e) = ctx.peer_manager.record_disconnection(peer_addr) {
        warn!("Failed to record disconnection: {e}");
    }
    let _ = stream.shutdown(Shutdown::Both);
    Ok(report)
}

/// Connect with a bounded timeout, trying up to `retries` times
pub fn connect_with_retries(addr: SocketAddr, timeout: Duration, retries: u32) -> Result<TcpStream> {
    let mut last_error = None;
    for attempt in 1..=retries.max(1) {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                warn!("Connection attempt {attempt}/{retries} to {addr} failed: {e}");
                last_error = Some(e);
                if attempt < retries {
                    thread::sleep(RETRY_BACKOFF);
                }
            }
        }
    }
    Err(BlockchainError::Network(format!(
        "Failed to connect to {addr}: {}",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Inbound side of the peer network
pub struct Server {
    ctx: SyncContext,
}

impl Server {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    pub fn bind(addr: SocketAddr) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr}: {e}")))
    }

    /// Accept connections until `shutdown` is set, one thread per peer.
    /// Whoever sets the flag must connect once to wake the accept loop.
    pub fn run(&self, listener: TcpListener, shutdown: Arc<AtomicBool>) -> Result<()> {
        let local = listener.local_addr()?;
        info!("Server listening on {local}");

        for stream in listener.incoming() {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };

                    if !self
                        .ctx
                        .peer_manager
                        .should_accept_connection()
                        .unwrap_or(false)
                    {
                        warn!("Rejecting connection from {peer_addr}: connection limit reached");
                        let _ = stream.shutdown(Shutdown::Both);
                        continue;
                    }

                    let ctx = self.ctx.clone();
                    thread::spawn(move || {
                        match run_session(&ctx, stream, peer_addr, Direction::Inbound) {
                            Ok(report) => info!(
                                "Session with {peer_addr} ended: {} chains received, {} adopted",
                                report.chains_received, report.chains_adopted
                            ),
                            Err(e) => error!("Error handling connection from {peer_addr}: {e}"),
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }

        info!("Server on {local} stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Consensus;
    use crate::network::message::{Greeting, Package};
    use crate::testnet::test_utils::build_chain;
    use crate::wallet::Wallet;
    use serde_json::Deserializer;
    use std::io::BufReader;

    fn context(ledger: Arc<Ledger>) -> SyncContext {
        SyncContext {
            node_id: "server-node".to_string(),
            sink: Arc::new(Consensus::new(Arc::clone(&ledger))),
            ledger,
            peer_manager: Arc::new(PeerManager::new(4)),
            io_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_connect_to_closed_port_fails_after_retries() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect_with_retries(addr, Duration::from_millis(200), 2);
        assert!(matches!(result, Err(BlockchainError::Network(_))));
    }

    #[test]
    fn test_inbound_session_exchanges_chains() {
        let ledger = Arc::new(Ledger::with_genesis());
        let ctx = context(Arc::clone(&ledger));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));

        let server_shutdown = Arc::clone(&shutdown);
        let server = thread::spawn(move || Server::new(ctx).run(listener, server_shutdown));

        let wallet = Wallet::new().unwrap();
        let ours = build_chain(&wallet, 3, 1);
        let mut client = TcpStream::connect(addr).unwrap();
        announce(&mut client, "client-node", &ours).unwrap();

        // The server speaks first with its own greeting and chain
        let mut packages = Deserializer::from_reader(BufReader::new(client.try_clone().unwrap()))
            .into_iter::<Package>();
        match packages.next().unwrap().unwrap() {
            Package::Greeting(Greeting { node_id, chain_length, .. }) => {
                assert_eq!(node_id, "server-node");
                assert_eq!(chain_length, 1);
            }
            other => panic!("expected greeting, got {other:?}"),
        }
        assert!(matches!(packages.next().unwrap().unwrap(), Package::Chain(c) if c.len() == 1));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while ledger.len() != 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(*ledger.get_chain(), ours);

        drop(packages);
        drop(client);
        shutdown.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(addr);
        server.join().unwrap().unwrap();
    }

    #[test]
    fn test_only_inbound_streams_time_out_when_idle() {
        let ctx = context(Arc::new(Ledger::with_genesis()));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let dialed = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();

        configure_stream(&accepted, &ctx, Direction::Inbound).unwrap();
        configure_stream(&dialed, &ctx, Direction::Outbound).unwrap();

        assert_eq!(accepted.read_timeout().unwrap(), Some(ctx.idle_timeout));
        assert_eq!(dialed.read_timeout().unwrap(), None);
        assert_eq!(dialed.write_timeout().unwrap(), Some(ctx.io_timeout));
    }
}
