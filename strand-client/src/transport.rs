//! MTProto Intermediate transport framing and the stream dialer.
//!
//! Init bytes `ee ee ee ee` once per connection, then every packet is
//! `[4-byte LE length][payload]`.
//!
//! [MTProto Intermediate]: https://core.telegram.org/mtproto/mtproto-transports#intermediate

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::InvocationError;

/// Sent once, before the first frame.
pub const INTERMEDIATE_INIT: [u8; 4] = [0xee, 0xee, 0xee, 0xee];

/// Frames larger than this are refused.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

// ─── Streams ──────────────────────────────────────────────────────────────────

/// Any bidirectional byte stream the engine can talk MTProto over.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Stream for T {}

/// A type-erased [`Stream`].
pub type BoxedStream = Box<dyn Stream>;

/// Future returned by [`Dialer::dial`].
pub type DialFuture<'a> = Pin<Box<dyn Future<Output = io::Result<BoxedStream>> + Send + 'a>>;

/// Opens the byte stream for a server address.
pub trait Dialer: Send + Sync {
    /// Connect to `addr` (`host:port`).
    fn dial<'a>(&'a self, addr: &'a str) -> DialFuture<'a>;
}

/// Plain TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    fn dial<'a>(&'a self, addr: &'a str) -> DialFuture<'a> {
        Box::pin(async move {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

// ─── Framing ──────────────────────────────────────────────────────────────────

/// Write the init bytes.
pub async fn send_init<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<(), InvocationError> {
    writer.write_all(&INTERMEDIATE_INIT).await?;
    Ok(())
}

/// Send one frame.
pub async fn send_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<(), InvocationError> {
    let mut packet = Vec::with_capacity(4 + data.len());
    packet.extend_from_slice(&(data.len() as u32).to_le_bytes());
    packet.extend_from_slice(data);
    writer.write_all(&packet).await?;
    writer.flush().await?;
    Ok(())
}

/// Receive one frame.
///
/// A 4-byte payload holding a negative integer is the server's transport
/// error code (e.g. -404 for an unknown auth key) and becomes
/// [`InvocationError::Transport`].
pub async fn recv_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, InvocationError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(InvocationError::Protocol(format!("frame of {len} bytes exceeds the limit")));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    if let [a, b, c, d] = buf[..] {
        let code = i32::from_le_bytes([a, b, c, d]);
        if code < 0 {
            return Err(InvocationError::Transport(code));
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_are_length_prefixed() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        send_init(&mut a).await.unwrap();
        send_frame(&mut a, &[1, 2, 3, 4, 5, 6, 7, 8]).await.unwrap();

        let mut init = [0u8; 4];
        b.read_exact(&mut init).await.unwrap();
        assert_eq!(init, INTERMEDIATE_INIT);
        assert_eq!(recv_frame(&mut b).await.unwrap(), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn negative_word_is_a_transport_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        send_frame(&mut a, &(-404i32).to_le_bytes()).await.unwrap();
        assert!(matches!(recv_frame(&mut b).await, Err(InvocationError::Transport(-404))));
    }

    #[tokio::test]
    async fn oversized_frame_is_refused() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&((MAX_FRAME_LEN as u32) + 1).to_le_bytes()).await.unwrap();
        assert!(matches!(recv_frame(&mut b).await, Err(InvocationError::Protocol(_))));
    }

    #[tokio::test]
    async fn eof_is_io() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert!(matches!(recv_frame(&mut b).await, Err(InvocationError::Io(_))));
    }
}
