//! Bloomshare P2P File Discovery Library
//!
//! A peer-to-peer file-discovery overlay: each node keeps a bloom-filter
//! index of its shared directory, answers presence queries from peers,
//! relays queries it cannot answer (TTL-bounded, duplicate-suppressed),
//! and transfers files on demand.

pub mod core;
pub mod filter;
pub mod network;
pub mod storage;
pub mod utils;

// Re-export main types
pub use core::{Config, Message, Node, NodeEvent};
pub use filter::BloomFilter;
pub use network::{PeerConnection, PeerRegistry};
pub use storage::FileStore;
pub use utils::{
    error::{P2PError, Result},
    setup_logging,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
