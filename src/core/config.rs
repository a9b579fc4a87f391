use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub shared_dir: PathBuf,
    /// Peers to connect to at startup.
    pub peers: Vec<SocketAddr>,
    /// Bit-array length of the membership filter.
    pub filter_bits: usize,
    /// Number of probe functions.
    pub filter_hashes: u32,
    /// Hop budget for originated queries.
    pub initial_ttl: u8,
    /// How long a query may stay unanswered before it resolves not-found.
    pub request_timeout_secs: u64,
    pub max_frame_bytes: usize,
    pub max_peers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            shared_dir: PathBuf::from("./shared"),
            peers: Vec::new(),
            // 5000 bits / 7 probes keeps the false-positive rate near 0.1%
            // at 500 indexed files.
            filter_bits: 5000,
            filter_hashes: 7,
            initial_ttl: 4,
            request_timeout_secs: 10,
            max_frame_bytes: 10_000_000,
            max_peers: 50,
        }
    }
}
