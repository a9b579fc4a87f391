use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::utils::{P2PError, Result};

/// Length-prefixed framing: each frame is a 4-byte big-endian length followed
/// by exactly that many payload bytes. One frame holds one encoded message.
pub struct Transport;

impl Transport {
    pub async fn send_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let len = payload.len() as u32;
        writer.write_u32(len).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one frame, rejecting length fields above `max_size` before any
    /// payload allocation happens.
    pub async fn recv_frame<R>(reader: &mut R, max_size: usize) -> Result<Vec<u8>>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let len = reader.read_u32().await? as usize;

        if len > max_size {
            return Err(P2PError::MessageTooLarge(len));
        }

        let mut buffer = vec![0u8; len];
        reader.read_exact(&mut buffer).await?;

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        Transport::send_frame(&mut a, b"hello frame").await.unwrap();
        let payload = Transport::recv_frame(&mut b, 1024).await.unwrap();
        assert_eq!(payload, b"hello frame");
    }

    #[tokio::test]
    async fn consecutive_frames_stay_separate() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        Transport::send_frame(&mut a, b"one").await.unwrap();
        Transport::send_frame(&mut a, b"two").await.unwrap();
        assert_eq!(Transport::recv_frame(&mut b, 64).await.unwrap(), b"one");
        assert_eq!(Transport::recv_frame(&mut b, 64).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn oversized_length_field_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_u32(10_000).await.unwrap();
        let err = Transport::recv_frame(&mut b, 64).await.unwrap_err();
        assert!(matches!(err, P2PError::MessageTooLarge(10_000)));
    }

    #[tokio::test]
    async fn truncated_frame_fails() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_u32(8).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        let err = Transport::recv_frame(&mut b, 64).await.unwrap_err();
        assert!(matches!(err, P2PError::Io(_)));
    }
}
