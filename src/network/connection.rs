use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::core::protocol::{self, Message};
use crate::network::Transport;
use crate::utils::{P2PError, Result};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// The write side of a live peer connection, registered in the registry
/// under its address. The read side is owned by the connection's receive
/// task; the writer mutex guarantees a single writer per connection so a
/// dispatch reply and a relay originated elsewhere never interleave frames.
pub struct PeerConnection {
    addr: SocketAddr,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl PeerConnection {
    pub fn new<W>(addr: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            addr,
            writer: Mutex::new(Box::new(writer)),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn send(&self, message: &Message) -> Result<()> {
        let payload = protocol::encode(message)?;
        let mut writer = self.writer.lock().await;

        timeout(SEND_TIMEOUT, Transport::send_frame(&mut **writer, &payload))
            .await
            .map_err(|_| P2PError::Connection(format!("send timeout to {}", self.addr)))??;

        debug!("Sent frame to {}: {:?}", self.addr, message);
        Ok(())
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("addr", &self.addr)
            .finish()
    }
}
