//! The obfuscated copy loops shared by both relays.
//!
//! Each direction of a tunnel is one of these functions: read plaintext
//! from the SOCKS5 side and write obfuscated bytes to the wire
//! (`encode_copy`), or read obfuscated bytes off the wire and write
//! plaintext to the SOCKS5 side (`decode_copy`). Both relays pair one
//! of each per connection and run them concurrently.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::cipher::Cipher;

pub const BUFFER_SIZE: usize = 1024;

/// Wraps a reader of obfuscated bytes so it yields plaintext: every byte
/// newly placed in the caller's buffer is decoded in place before the
/// poll returns. Used by the server relay's handshake parser, which
/// otherwise has no reason to know the stream underneath it is obfuscated.
pub struct DecodingReader<R> {
    inner: R,
    cipher: Arc<Cipher>,
}

impl<R> DecodingReader<R> {
    pub fn new(inner: R, cipher: Arc<Cipher>) -> Self {
        DecodingReader { inner, cipher }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DecodingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                this.cipher.decode(&mut buf.filled_mut()[before..]);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// Wraps a writer so that whatever plaintext is passed to `write`/`write_all`
/// is encoded before it reaches the underlying transport. A short write of
/// `n` encoded bytes corresponds 1:1 to the first `n` plaintext bytes, so
/// partial writes are reported honestly.
pub struct EncodingWriter<W> {
    inner: W,
    cipher: Arc<Cipher>,
}

impl<W> EncodingWriter<W> {
    pub fn new(inner: W, cipher: Arc<Cipher>) -> Self {
        EncodingWriter { inner, cipher }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for EncodingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let mut encoded = buf.to_vec();
        this.cipher.encode(&mut encoded);
        Pin::new(&mut this.inner).poll_write(cx, &encoded)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Reads obfuscated bytes from `reader`, decodes them in place, writes
/// the plaintext to `writer`. Returns on EOF or the first I/O error.
pub async fn decode_copy<R, W>(cipher: &Arc<Cipher>, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        cipher.decode(&mut buf[..n]);
        writer.write_all(&buf[..n]).await?;
    }
}

/// Reads plaintext from `reader`, encodes it in place, writes the
/// obfuscated bytes to `writer`. Returns on EOF or the first I/O error.
pub async fn encode_copy<R, W>(cipher: &Arc<Cipher>, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        cipher.encode(&mut buf[..n]);
        writer.write_all(&buf[..n]).await?;
    }
}
