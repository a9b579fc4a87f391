use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::core::protocol;
use crate::core::routing::{NodeEvent, RoutingEngine};
use crate::core::Config;
use crate::filter::BloomFilter;
use crate::network::{PeerConnection, PeerRegistry, Transport};
use crate::storage::FileStore;
use crate::utils::{P2PError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The node coordinator: owns one filter, one registry, one store and the
/// routing engine, runs the accept loop and the per-connection receive
/// loops, and exposes the operations the CLI drives.
pub struct Node {
    pub config: Config,
    store: Arc<FileStore>,
    registry: Arc<PeerRegistry>,
    engine: Arc<RoutingEngine>,
    events_rx: Option<mpsc::Receiver<NodeEvent>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl Node {
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(FileStore::new(config.shared_dir.clone()).await?);

        // The filter is seeded once from the shared directory and frozen;
        // nothing mutates it afterwards, so it needs no locking.
        let mut filter = BloomFilter::new(config.filter_bits, config.filter_hashes);
        let indexed = store.list().await?;
        for name in &indexed {
            filter.add(name);
        }
        info!(
            "Indexed {} file(s): {:?} (estimated fp rate {:.5})",
            indexed.len(),
            indexed,
            filter.false_positive_rate(indexed.len())
        );

        let registry = Arc::new(PeerRegistry::new(config.max_peers));
        let (events_tx, events_rx) = mpsc::channel(64);
        let engine = Arc::new(RoutingEngine::new(
            Arc::new(filter),
            registry.clone(),
            store.clone(),
            events_tx,
            config.initial_ttl,
            Duration::from_secs(config.request_timeout_secs),
        ));

        Ok(Self {
            config,
            store,
            registry,
            engine,
            events_rx: Some(events_rx),
            shutdown_tx: None,
        })
    }

    /// Connect configured peers, start listening, and park until shutdown
    /// or ctrl-c.
    pub async fn run(&mut self) -> Result<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        for peer in self.config.peers.clone() {
            self.connect_peer(peer).await?;
        }

        if self.config.port > 0 {
            self.start_listening().await?;
        }

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
            }
        }

        Ok(())
    }

    /// Bind the listener and spawn the accept loop. Returns the bound
    /// address (useful when the configured port is 0).
    pub async fn start_listening(&self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port))
            .await
            .map_err(|e| P2PError::Connection(format!("failed to bind port {}: {}", self.config.port, e)))?;
        let local = listener.local_addr()?;
        info!("Listening for peers on {}", local);

        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let max_frame = self.config.max_frame_bytes;

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        info!("New connection from: {}", addr);
                        if let Err(e) = Self::register_stream(
                            engine.clone(),
                            registry.clone(),
                            stream,
                            addr,
                            max_frame,
                        )
                        .await
                        {
                            warn!("Failed to register {}: {}", addr, e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(local)
    }

    /// Dial a peer and register the connection. A transport failure leaves
    /// the registry unmodified.
    pub async fn connect_peer(&self, addr: SocketAddr) -> Result<()> {
        if self.registry.get(addr).await.is_some() {
            debug!("Already connected to {}", addr);
            return Ok(());
        }

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| P2PError::Connection(format!("connect timeout to {}", addr)))?
            .map_err(|e| P2PError::Connection(format!("failed to connect to {}: {}", addr, e)))?;

        Self::register_stream(
            self.engine.clone(),
            self.registry.clone(),
            stream,
            addr,
            self.config.max_frame_bytes,
        )
        .await?;
        info!("Connected to peer at {}", addr);
        Ok(())
    }

    /// Originate a presence query for `filename` toward a connected peer.
    pub async fn request_file(&self, filename: &str, peer: SocketAddr) -> Result<u64> {
        self.engine.originate(filename, peer).await
    }

    pub async fn list_peers(&self) -> Vec<SocketAddr> {
        self.registry.addrs().await
    }

    pub async fn list_files(&self) -> Result<Vec<String>> {
        self.store.list().await
    }

    /// The terminal-event stream for originated requests: one event per
    /// resolved request, for the node's lifetime. The receiver itself can
    /// be taken only once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<NodeEvent>> {
        self.events_rx.take()
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        Ok(())
    }

    /// Register a freshly accepted or dialed stream under `addr` and start
    /// its receive task. A registration failure (duplicate address, peer
    /// cap) drops both halves, closing the socket.
    async fn register_stream(
        engine: Arc<RoutingEngine>,
        registry: Arc<PeerRegistry>,
        stream: TcpStream,
        addr: SocketAddr,
        max_frame: usize,
    ) -> Result<()> {
        stream
            .set_nodelay(true)
            .map_err(|e| P2PError::Connection(format!("failed to set TCP_NODELAY: {}", e)))?;

        let (read_half, write_half) = stream.into_split();
        let conn = Arc::new(PeerConnection::new(addr, write_half));
        registry.insert(conn.clone()).await?;

        tokio::spawn(Self::receive_loop(
            engine, registry, conn, read_half, max_frame,
        ));
        Ok(())
    }

    /// Receive-decode-dispatch loop for one connection; deregisters exactly
    /// once on the way out.
    async fn receive_loop(
        engine: Arc<RoutingEngine>,
        registry: Arc<PeerRegistry>,
        conn: Arc<PeerConnection>,
        mut reader: OwnedReadHalf,
        max_frame: usize,
    ) {
        loop {
            let payload = match Transport::recv_frame(&mut reader, max_frame).await {
                Ok(payload) => payload,
                Err(P2PError::MessageTooLarge(n)) => {
                    warn!("Closing {}: oversized frame of {} bytes", conn.addr(), n);
                    break;
                }
                Err(e) => {
                    debug!("Connection lost with {}: {}", conn.addr(), e);
                    break;
                }
            };

            let message = match protocol::decode(&payload) {
                Ok(message) => message,
                Err(e) => {
                    // Malformed traffic closes this connection; the node
                    // keeps serving everyone else.
                    warn!("Closing {}: {}", conn.addr(), e);
                    break;
                }
            };

            if let Err(e) = engine.handle(message, &conn).await {
                warn!("Failed to handle message from {}: {}", conn.addr(), e);
                if matches!(e, P2PError::Connection(_) | P2PError::Io(_)) {
                    break;
                }
            }
        }

        registry.remove(conn.addr()).await;
        info!("Peer disconnected: {}", conn.addr());
    }
}
