use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc};
use tokio::time::sleep;

use crate::core::protocol::Message;
use crate::filter::{BloomFilter, SeenRequests};
use crate::network::{PeerConnection, PeerRegistry};
use crate::storage::FileStore;
use crate::utils::{P2PError, Result};

const SEEN_CAPACITY: usize = 1024;

/// Terminal outcomes surfaced to whoever called `request_file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    FileReceived {
        filename: String,
        saved_to: PathBuf,
    },
    FileUnavailable {
        filename: String,
        request_id: u64,
    },
}

/// Relay bookkeeping for one in-flight query: where it came from (`None`
/// when this node originated it), how many downstream answers are still
/// outstanding, the remaining hop budget, and which peers were already asked.
struct PendingQuery {
    filename: String,
    origin: Option<Arc<PeerConnection>>,
    awaiting: usize,
    ttl: u8,
    tried: HashSet<SocketAddr>,
}

enum NegativeOutcome {
    Settled,
    Widen {
        filename: String,
        ttl: u8,
        targets: Vec<Arc<PeerConnection>>,
    },
    Resolve(PendingQuery),
}

/// The per-message protocol state machine. Stateless across messages except
/// for what it reads from the filter, registry and store, plus the `seen`
/// dedup set and the `pending` relay table.
pub struct RoutingEngine {
    filter: Arc<BloomFilter>,
    registry: Arc<PeerRegistry>,
    store: Arc<FileStore>,
    seen: Mutex<SeenRequests>,
    pending: Mutex<HashMap<u64, PendingQuery>>,
    events: mpsc::Sender<NodeEvent>,
    initial_ttl: u8,
    request_timeout: Duration,
}

impl RoutingEngine {
    pub fn new(
        filter: Arc<BloomFilter>,
        registry: Arc<PeerRegistry>,
        store: Arc<FileStore>,
        events: mpsc::Sender<NodeEvent>,
        initial_ttl: u8,
        request_timeout: Duration,
    ) -> Self {
        Self {
            filter,
            registry,
            store,
            seen: Mutex::new(SeenRequests::new(SEEN_CAPACITY)),
            pending: Mutex::new(HashMap::new()),
            events,
            initial_ttl,
            request_timeout,
        }
    }

    /// Originate a presence query for `filename` toward the named peer.
    /// Returns the fresh request ID the eventual `NodeEvent` will carry.
    pub async fn originate(self: &Arc<Self>, filename: &str, peer: SocketAddr) -> Result<u64> {
        let conn = self
            .registry
            .get(peer)
            .await
            .ok_or(P2PError::UnknownPeer(peer))?;

        let request_id = rand::random::<u64>();
        self.seen.lock().await.insert(request_id);

        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                request_id,
                PendingQuery {
                    filename: filename.to_string(),
                    origin: None,
                    awaiting: 1,
                    ttl: self.initial_ttl,
                    tried: HashSet::from([peer]),
                },
            );
        }

        let check = Message::BloomCheck {
            filename: filename.to_string(),
            request_id,
            ttl: self.initial_ttl,
        };
        if let Err(e) = conn.send(&check).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        info!("Requesting file {} from {} (request {})", filename, peer, request_id);
        self.arm_timeout(request_id);
        Ok(request_id)
    }

    /// Dispatch one decoded inbound message. Errors returned here are
    /// failures on the `from` connection itself; the receive loop reacts by
    /// tearing that connection down.
    pub async fn handle(self: &Arc<Self>, message: Message, from: &Arc<PeerConnection>) -> Result<()> {
        debug!("Dispatching {:?} from {}", message, from.addr());
        match message {
            Message::BloomCheck {
                filename,
                request_id,
                ttl,
            } => self.on_bloom_check(filename, request_id, ttl, from).await,
            Message::BloomCheckResponse {
                filename,
                request_id,
                present,
            } => {
                self.on_check_response(filename, request_id, present, from)
                    .await
            }
            Message::FileRequest {
                filename,
                request_id,
            } => self.on_file_request(filename, request_id, from).await,
            Message::FileData {
                filename,
                request_id,
                data,
            } => self.on_file_data(filename, request_id, data, from).await,
            Message::FileNotFound { request_id, .. } => {
                self.note_negatives(request_id, 1).await;
                Ok(())
            }
        }
    }

    /// Answer a presence query, or relay it when the local filter misses.
    async fn on_bloom_check(
        self: &Arc<Self>,
        filename: String,
        request_id: u64,
        ttl: u8,
        from: &Arc<PeerConnection>,
    ) -> Result<()> {
        if !self.seen.lock().await.insert(request_id) {
            debug!("Dropping duplicate query {} for {}", request_id, filename);
            return Ok(());
        }

        if self.filter.check(&filename) {
            info!("Bloom check for {}: present (request {})", filename, request_id);
            return from
                .send(&Message::BloomCheckResponse {
                    filename,
                    request_id,
                    present: true,
                })
                .await;
        }

        let relays = self.registry.others(from.addr()).await;
        if ttl == 0 || relays.is_empty() {
            info!("Bloom check for {}: not present (request {})", filename, request_id);
            return from
                .send(&Message::BloomCheckResponse {
                    filename,
                    request_id,
                    present: false,
                })
                .await;
        }

        let ttl = ttl - 1;
        let mut tried: HashSet<SocketAddr> = relays.iter().map(|c| c.addr()).collect();
        tried.insert(from.addr());
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                request_id,
                PendingQuery {
                    filename: filename.clone(),
                    origin: Some(from.clone()),
                    awaiting: relays.len(),
                    ttl,
                    tried,
                },
            );
        }

        info!(
            "Relaying query for {} to {} peer(s), ttl {} (request {})",
            filename,
            relays.len(),
            ttl,
            request_id
        );
        let failed = self.fan_out(&filename, request_id, ttl, relays).await;
        if failed > 0 {
            self.note_negatives(request_id, failed).await;
        }

        self.arm_timeout(request_id);
        Ok(())
    }

    async fn on_check_response(
        self: &Arc<Self>,
        filename: String,
        request_id: u64,
        present: bool,
        from: &Arc<PeerConnection>,
    ) -> Result<()> {
        if present {
            debug!("{} reports {} present, requesting it", from.addr(), filename);
            return from
                .send(&Message::FileRequest {
                    filename,
                    request_id,
                })
                .await;
        }

        self.note_negatives(request_id, 1).await;
        Ok(())
    }

    /// Serve a transfer. A miss here is a filter false positive (or a relay
    /// racing the store); it gets an explicit negative rather than silence.
    async fn on_file_request(
        &self,
        filename: String,
        request_id: u64,
        from: &Arc<PeerConnection>,
    ) -> Result<()> {
        if self.store.exists(&filename).await {
            let data = self.store.read(&filename).await?;
            info!("Sending file {} ({} bytes) to {}", filename, data.len(), from.addr());
            return from
                .send(&Message::FileData {
                    filename,
                    request_id,
                    data,
                })
                .await;
        }

        debug!("File {} not on disk, answering not-found", filename);
        from.send(&Message::FileNotFound {
            filename,
            request_id,
        })
        .await
    }

    /// A transfer arriving for a query we relayed flows back upstream along
    /// the query path; one we originated is persisted locally.
    async fn on_file_data(
        &self,
        filename: String,
        request_id: u64,
        data: Vec<u8>,
        from: &Arc<PeerConnection>,
    ) -> Result<()> {
        let query = match self.pending.lock().await.remove(&request_id) {
            Some(query) => query,
            None => {
                debug!(
                    "Dropping file data for unknown request {} from {}",
                    request_id,
                    from.addr()
                );
                return Ok(());
            }
        };

        // The responder's filename field is untrusted; the query we keep in
        // the pending table is what was actually asked for.
        if filename != query.filename {
            debug!(
                "File data named {} for a query about {} (request {})",
                filename, query.filename, request_id
            );
        }

        match query.origin {
            Some(upstream) => {
                info!(
                    "Forwarding file {} upstream to {} (request {})",
                    query.filename,
                    upstream.addr(),
                    request_id
                );
                if let Err(e) = upstream
                    .send(&Message::FileData {
                        filename: query.filename,
                        request_id,
                        data,
                    })
                    .await
                {
                    warn!("Upstream forward to {} failed: {}", upstream.addr(), e);
                    self.registry.remove(upstream.addr()).await;
                }
                Ok(())
            }
            None => {
                match self.store.save_received(&query.filename, &data).await {
                    Ok(saved_to) => {
                        let _ = self
                            .events
                            .send(NodeEvent::FileReceived {
                                filename: query.filename,
                                saved_to,
                            })
                            .await;
                    }
                    Err(e) => {
                        // A local persistence failure must still resolve the
                        // request, or the originator waits forever. The
                        // connection itself is healthy, so don't fail it.
                        warn!(
                            "Failed to persist {} (request {}): {}",
                            query.filename, request_id, e
                        );
                        let _ = self
                            .events
                            .send(NodeEvent::FileUnavailable {
                                filename: query.filename,
                                request_id,
                            })
                            .await;
                    }
                }
                Ok(())
            }
        }
    }

    /// Account `count` negative answers against a pending query. When none
    /// remain outstanding, widen to still-untried peers while hop budget
    /// lasts, then resolve as not-found.
    async fn note_negatives(self: &Arc<Self>, request_id: u64, count: usize) {
        let mut failures = count;
        loop {
            let outcome = self.settle_negatives(request_id, failures).await;
            match outcome {
                NegativeOutcome::Settled => return,
                NegativeOutcome::Resolve(query) => {
                    self.resolve_not_found(request_id, query).await;
                    return;
                }
                NegativeOutcome::Widen {
                    filename,
                    ttl,
                    targets,
                } => {
                    debug!(
                        "Widening query for {} to {} peer(s), ttl {} (request {})",
                        filename,
                        targets.len(),
                        ttl,
                        request_id
                    );
                    let failed = self.fan_out(&filename, request_id, ttl, targets).await;
                    if failed == 0 {
                        return;
                    }
                    failures = failed;
                }
            }
        }
    }

    async fn settle_negatives(&self, request_id: u64, count: usize) -> NegativeOutcome {
        let mut pending = self.pending.lock().await;
        let Some(query) = pending.get_mut(&request_id) else {
            debug!("Negative answer for unknown request {}", request_id);
            return NegativeOutcome::Settled;
        };

        query.awaiting = query.awaiting.saturating_sub(count);
        if query.awaiting > 0 {
            return NegativeOutcome::Settled;
        }

        if query.ttl > 0 {
            let untried: Vec<Arc<PeerConnection>> = self
                .registry
                .all()
                .await
                .into_iter()
                .filter(|c| !query.tried.contains(&c.addr()))
                .collect();
            if !untried.is_empty() {
                query.ttl -= 1;
                query.awaiting = untried.len();
                for conn in &untried {
                    query.tried.insert(conn.addr());
                }
                return NegativeOutcome::Widen {
                    filename: query.filename.clone(),
                    ttl: query.ttl,
                    targets: untried,
                };
            }
        }

        match pending.remove(&request_id) {
            Some(query) => NegativeOutcome::Resolve(query),
            None => NegativeOutcome::Settled,
        }
    }

    /// Send one query to each target, deregistering peers whose connection
    /// fails. Returns how many sends failed.
    async fn fan_out(
        &self,
        filename: &str,
        request_id: u64,
        ttl: u8,
        targets: Vec<Arc<PeerConnection>>,
    ) -> usize {
        let mut failed = 0;
        for conn in targets {
            let check = Message::BloomCheck {
                filename: filename.to_string(),
                request_id,
                ttl,
            };
            if let Err(e) = conn.send(&check).await {
                warn!("Relay to {} failed: {}", conn.addr(), e);
                self.registry.remove(conn.addr()).await;
                failed += 1;
            }
        }
        failed
    }

    /// Terminal negative: report upstream, or emit the event when this node
    /// originated the query.
    async fn resolve_not_found(&self, request_id: u64, query: PendingQuery) {
        match query.origin {
            Some(upstream) => {
                debug!(
                    "Query for {} exhausted, reporting not-found to {} (request {})",
                    query.filename,
                    upstream.addr(),
                    request_id
                );
                let reply = Message::FileNotFound {
                    filename: query.filename,
                    request_id,
                };
                if let Err(e) = upstream.send(&reply).await {
                    warn!("Not-found reply to {} failed: {}", upstream.addr(), e);
                    self.registry.remove(upstream.addr()).await;
                }
            }
            None => {
                info!(
                    "{}",
                    P2PError::RelayExhausted(format!(
                        "{} (request {})",
                        query.filename, request_id
                    ))
                );
                let _ = self
                    .events
                    .send(NodeEvent::FileUnavailable {
                        filename: query.filename,
                        request_id,
                    })
                    .await;
            }
        }
    }

    /// Every pending registration gets one timer so the state machine
    /// terminates even when replies never arrive.
    fn arm_timeout(self: &Arc<Self>, request_id: u64) {
        let engine = self.clone();
        tokio::spawn(async move {
            sleep(engine.request_timeout).await;
            let expired = engine.pending.lock().await.remove(&request_id);
            if let Some(query) = expired {
                warn!(
                    "Request {} for {} timed out after {:?}",
                    request_id, query.filename, engine.request_timeout
                );
                engine.resolve_not_found(request_id, query).await;
            }
        });
    }
}
