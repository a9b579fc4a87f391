pub mod connection;
pub mod registry;
pub mod transport;

pub use connection::PeerConnection;
pub use registry::PeerRegistry;
pub use transport::Transport;
