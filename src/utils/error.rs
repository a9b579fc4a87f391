use std::net::SocketAddr;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, P2PError>;

/// Error taxonomy for the overlay. No variant is fatal to the process;
/// every failure is scoped to one connection or one request.
#[derive(Error, Debug)]
pub enum P2PError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("relay exhausted for: {0}")]
    RelayExhausted(String),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("peer already registered: {0}")]
    DuplicatePeer(SocketAddr),

    #[error("too many peers: {0}")]
    TooManyPeers(usize),

    #[error("no connection to peer: {0}")]
    UnknownPeer(SocketAddr),
}

impl From<std::io::Error> for P2PError {
    fn from(err: std::io::Error) -> Self {
        P2PError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for P2PError {
    fn from(err: serde_json::Error) -> Self {
        P2PError::MalformedMessage(err.to_string())
    }
}
