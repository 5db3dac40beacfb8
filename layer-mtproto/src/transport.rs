//! Pluggable transport layer: the abridged length-prefixed byte pipe.
//!
//! This module pins only the byte-stream contract the handshake engine and
//! session pipeline are written against — `read_exact`, `read_some`,
//! `write`, `close` — plus one concrete implementation over a real TCP
//! socket using MTProto's "abridged" framing. Bring your own transport
//! (WebSocket, QUIC, an in-memory pipe for tests) by implementing
//! [`Transport`] directly.

use std::collections::VecDeque;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Byte-stream transport relied on by the handshake and session pipeline.
///
/// Implementations own their own internal framing/buffering; callers only
/// ever see a flat byte stream of message payloads.
pub trait Transport: Send {
    /// Error type surfaced to callers; any failure here is fatal to the connection.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read exactly `n` bytes, waiting for more data to arrive as needed.
    async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, Self::Error>;

    /// Read up to `max` bytes, returning whatever is immediately available.
    async fn read_some(&mut self, max: usize) -> Result<Vec<u8>, Self::Error>;

    /// Write `data` in full as one message.
    async fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Close the underlying connection.
    async fn close(&mut self) -> Result<(), Self::Error>;
}

/// A [`Transport`] over a real TCP socket using MTProto's "abridged" framing:
/// one `0xef` sent once at connection start, then each message is
/// `[length/4, as 1 or 4 bytes][payload]`.
///
/// [MTProto Abridged]: https://core.telegram.org/mtproto/mtproto-transports#abridged
pub struct AbridgedTcpTransport {
    stream: TcpStream,
    init_sent: bool,
    buf: VecDeque<u8>,
}

impl AbridgedTcpTransport {
    /// Connect to `host:port` and wrap the resulting socket.
    pub async fn connect(host: &str, port: u16) -> std::io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self { stream, init_sent: false, buf: VecDeque::new() })
    }

    /// Adopt an already-connected socket.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream, init_sent: false, buf: VecDeque::new() }
    }

    async fn fill_next_packet(&mut self) -> std::io::Result<()> {
        let mut len_byte = [0u8; 1];
        self.stream.read_exact(&mut len_byte).await?;
        let words = if len_byte[0] == 0x7f {
            let mut rest = [0u8; 3];
            self.stream.read_exact(&mut rest).await?;
            (rest[0] as u32) | ((rest[1] as u32) << 8) | ((rest[2] as u32) << 16)
        } else {
            len_byte[0] as u32
        };
        let mut payload = vec![0u8; (words as usize) * 4];
        self.stream.read_exact(&mut payload).await?;
        self.buf.extend(payload);
        Ok(())
    }

    async fn ensure_buffered(&mut self, want: usize) -> std::io::Result<()> {
        while self.buf.len() < want {
            self.fill_next_packet().await?;
        }
        Ok(())
    }
}

impl Transport for AbridgedTcpTransport {
    type Error = std::io::Error;

    async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, Self::Error> {
        self.ensure_buffered(n).await?;
        Ok(self.buf.drain(..n).collect())
    }

    async fn read_some(&mut self, max: usize) -> Result<Vec<u8>, Self::Error> {
        if self.buf.is_empty() {
            self.fill_next_packet().await?;
        }
        let n = max.min(self.buf.len());
        Ok(self.buf.drain(..n).collect())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if !self.init_sent {
            self.stream.write_all(&[0xef]).await?;
            self.init_sent = true;
        }
        let len = data.len() / 4;
        if len < 127 {
            self.stream.write_all(&[len as u8]).await?;
        } else {
            self.stream
                .write_all(&[0x7f, (len & 0xff) as u8, ((len >> 8) & 0xff) as u8, ((len >> 16) & 0xff) as u8])
                .await?;
        }
        self.stream.write_all(data).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.stream.shutdown().await
    }
}
