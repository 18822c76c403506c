use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use log::{debug, warn};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use super::deadline::Deadline;
use super::io_state::{Fingerprint, ReadState, WriteState};
use super::secure_halves::{SecureReadHalf, SecureWriteHalf};
use crate::async_stream::AsyncStream;
use crate::stream_cipher::Cipher;

const UNKNOWN_IDENTITY: &str = "<unknown>";

/// Tri-state socket toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Toggle {
    #[default]
    Unchanged,
    Disable,
    Enable,
}

impl Toggle {
    fn as_flag(self) -> Option<bool> {
        match self {
            Toggle::Unchanged => None,
            Toggle::Disable => Some(false),
            Toggle::Enable => Some(true),
        }
    }
}

/// Negative leaves the option alone, zero disables it, positive enables it.
impl From<i8> for Toggle {
    fn from(value: i8) -> Self {
        match value {
            v if v < 0 => Toggle::Unchanged,
            0 => Toggle::Disable,
            _ => Toggle::Enable,
        }
    }
}

impl From<bool> for Toggle {
    fn from(enabled: bool) -> Self {
        if enabled {
            Toggle::Enable
        } else {
            Toggle::Disable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SocketOptions {
    /// Drop any read and write deadline, typically set during the handshake.
    pub clear_deadline: bool,
    pub keep_alive: Toggle,
    pub no_delay: Toggle,
}

impl SocketOptions {
    pub fn from_tristate(disable_deadline: i8, keep_alive: i8, no_delay: i8) -> Self {
        Self {
            clear_deadline: disable_deadline > 0,
            keep_alive: keep_alive.into(),
            no_delay: no_delay.into(),
        }
    }
}

/// A raw connection decorated with an optional stream cipher and optional SHA-1
/// accumulators over the wire bytes read and written.
///
/// Digesting is meant for the plaintext handshake phase, where both sides derive
/// a fingerprint from what crossed the wire. The cipher is meant for the bulk
/// phase afterwards. Nothing stops both from being active at once: reads fold
/// bytes into the digest before decrypting, writes encrypt before folding.
pub struct SecureStream<S> {
    stream: S,
    read_state: ReadState,
    write_state: WriteState,
    identifier: Option<String>,
}

impl<S> SecureStream<S> {
    /// Wraps `stream` with no cipher and no digests.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_state: ReadState::new(None, None),
            write_state: WriteState::new(None, None),
            identifier: None,
        }
    }

    pub fn with_digests(stream: S) -> Self {
        Self {
            stream,
            read_state: ReadState::new(None, Some(Sha1::new())),
            write_state: WriteState::new(None, Some(Sha1::new())),
            identifier: None,
        }
    }

    pub fn with_cipher(stream: S, cipher: Cipher) -> Self {
        let (encryptor, decryptor) = cipher.into_parts();
        Self {
            stream,
            read_state: ReadState::new(Some(decryptor), None),
            write_state: WriteState::new(Some(encryptor), None),
            identifier: None,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unwraps the raw connection. Flush first: ciphertext still buffered in the
    /// wrapper is discarded.
    pub fn into_inner(self) -> S {
        if self.write_state.has_pending() {
            warn!("Discarding unflushed ciphertext while unwrapping secure stream");
        }
        self.stream
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier = Some(identifier.into());
    }

    pub fn set_read_deadline(&mut self, deadline: Deadline) {
        self.read_state.set_deadline(deadline);
    }

    pub fn set_write_deadline(&mut self, deadline: Deadline) {
        self.write_state.set_deadline(deadline);
    }

    pub fn set_deadline(&mut self, deadline: Deadline) {
        self.set_read_deadline(deadline);
        self.set_write_deadline(deadline);
    }

    pub fn read_deadline(&self) -> Deadline {
        self.read_state.deadline()
    }

    pub fn write_deadline(&self) -> Deadline {
        self.write_state.deadline()
    }

    pub fn has_read_digest(&self) -> bool {
        self.read_state.has_digest()
    }

    pub fn has_write_digest(&self) -> bool {
        self.write_state.has_digest()
    }

    /// Drops both digest accumulators. Safe to call more than once.
    pub fn release_digests(&mut self) {
        self.read_state.release_digest();
        self.write_state.release_digest();
    }

    /// Returns the SHA-1 of every byte read so far and drops the accumulator.
    ///
    /// Fails if digesting was never enabled, or the accumulator was already
    /// finalized or released.
    pub fn finalize_read_digest(&mut self) -> io::Result<Fingerprint> {
        self.read_state.finalize_digest()
    }

    /// Returns the SHA-1 of every wire byte written so far and drops the
    /// accumulator. Same failure rules as `finalize_read_digest`.
    pub fn finalize_write_digest(&mut self) -> io::Result<Fingerprint> {
        self.write_state.finalize_digest()
    }
}

impl<S: AsyncStream> SecureStream<S> {
    /// The explicit identifier if one was set, otherwise the peer address.
    pub fn identifier(&self) -> String {
        match &self.identifier {
            Some(identifier) => identifier.clone(),
            None => match self.stream.peer_addr() {
                Ok(addr) => addr.to_string(),
                Err(_) => UNKNOWN_IDENTITY.to_string(),
            },
        }
    }

    pub fn configure_socket(&mut self, options: SocketOptions) {
        if options.clear_deadline {
            self.set_deadline(Deadline::Unbounded);
        }
        if let Some(enabled) = options.keep_alive.as_flag()
            && let Err(e) = self.stream.set_keepalive(enabled)
        {
            debug!("Failed to set keepalive={enabled} on {}: {e}", self.identifier());
        }
        if let Some(enabled) = options.no_delay.as_flag()
            && let Err(e) = self.stream.set_nodelay(enabled)
        {
            debug!("Failed to set nodelay={enabled} on {}: {e}", self.identifier());
        }
    }

    /// Half-closes the read side when the transport supports it.
    pub fn close_read(&self) -> io::Result<()> {
        self.stream.shutdown_read()
    }

    /// Flushes buffered ciphertext and half-closes the write side.
    pub async fn close_write(&mut self) -> io::Result<()> {
        self.shutdown().await
    }

    /// Flushes, shuts down both directions, and drops the connection.
    pub async fn close(mut self) -> io::Result<()> {
        let write_result = self.shutdown().await;
        let read_result = self.stream.shutdown_read();
        write_result.and(read_result)
    }

    /// Splits into independently owned read and write halves, each carrying its
    /// direction's cipher, digest and deadline.
    pub fn into_split(self) -> (SecureReadHalf<S>, SecureWriteHalf<S>) {
        let identifier: Arc<str> = Arc::from(self.identifier());
        let (reader, writer) = tokio::io::split(self.stream);
        (
            SecureReadHalf::new(reader, self.read_state, identifier.clone()),
            SecureWriteHalf::new(writer, self.write_state, identifier),
        )
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for SecureStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.read_state
            .poll_read(cx, Pin::new(&mut this.stream), buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for SecureStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.write_state
            .poll_write(cx, Pin::new(&mut this.stream), buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.write_state.poll_flush(cx, Pin::new(&mut this.stream))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.write_state.poll_shutdown(cx, Pin::new(&mut this.stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_cipher::{CipherMethod, IV_LEN};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tokio::net::{TcpListener, TcpStream};

    const KEY: [u8; 32] = [0x42; 32];
    const IV_UP: [u8; IV_LEN] = [0x11; IV_LEN];
    const IV_DOWN: [u8; IV_LEN] = [0x22; IV_LEN];

    fn client_cipher() -> Cipher {
        Cipher::from_method(CipherMethod::Aes256Ctr, &KEY, &IV_UP, &IV_DOWN).unwrap()
    }

    fn server_cipher() -> Cipher {
        Cipher::from_method(CipherMethod::Aes256Ctr, &KEY, &IV_DOWN, &IV_UP).unwrap()
    }

    fn test_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_cipher_roundtrip_across_chunks() {
        let (a, b) = duplex(1024);
        let mut client = SecureStream::with_cipher(a, client_cipher());
        let mut server = SecureStream::with_cipher(b, server_cipher());

        let data = test_data(10_000);
        let expected = data.clone();

        let writer = tokio::spawn(async move {
            let mut offset = 0;
            for size in [1usize, 7, 512, 3000, 13, 6467].iter().cycle() {
                if offset == data.len() {
                    break;
                }
                let end = std::cmp::min(offset + size, data.len());
                client.write_all(&data[offset..end]).await.unwrap();
                offset = end;
            }
            client.flush().await.unwrap();
            client.close_write().await.unwrap();
            client
        });

        let mut received = Vec::new();
        let mut buf = [0u8; 333];
        loop {
            let n = server.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        writer.await.unwrap();

        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_wire_bytes_are_encrypted() {
        let (a, mut b) = duplex(1024);
        let mut client = SecureStream::with_cipher(a, client_cipher());

        client.write_all(b"plaintext payload").await.unwrap();
        client.flush().await.unwrap();

        let mut wire = [0u8; 17];
        b.read_exact(&mut wire).await.unwrap();
        assert_ne!(&wire, b"plaintext payload");

        server_cipher().decrypt(&mut wire);
        assert_eq!(&wire, b"plaintext payload");
    }

    #[tokio::test]
    async fn test_write_digest_is_chunking_invariant() {
        let (a, mut b) = duplex(64 * 1024);
        let mut stream = SecureStream::with_digests(a);

        let data = test_data(20_000);
        for chunk in data.chunks(777) {
            stream.write_all(chunk).await.unwrap();
        }
        stream.flush().await.unwrap();

        let expected: Fingerprint = Sha1::digest(&data).into();
        assert_eq!(stream.finalize_write_digest().unwrap(), expected);

        let mut wire = vec![0u8; data.len()];
        b.read_exact(&mut wire).await.unwrap();
        assert_eq!(wire, data);
    }

    #[tokio::test]
    async fn test_read_digest_matches_bytes_read() {
        let (a, mut b) = duplex(64 * 1024);
        let mut stream = SecureStream::with_digests(a);

        let data = test_data(5000);
        b.write_all(&data).await.unwrap();
        drop(b);

        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, data);

        let expected: Fingerprint = Sha1::digest(&data).into();
        assert_eq!(stream.finalize_read_digest().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_digests_cover_wire_form_with_cipher() {
        let (a, b) = duplex(64 * 1024);
        let mut client = SecureStream::with_digests(a);
        let mut server = SecureStream::with_digests(b);
        // Combined mode: swap in ciphers while keeping the accumulators.
        let (enc, _) = client_cipher().into_parts();
        let (_, dec) = server_cipher().into_parts();
        client.write_state = WriteState::new(Some(enc), Some(Sha1::new()));
        server.read_state = ReadState::new(Some(dec), Some(Sha1::new()));

        let data = test_data(4096);
        client.write_all(&data).await.unwrap();
        client.flush().await.unwrap();

        let mut received = vec![0u8; data.len()];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, data);

        let mut ciphertext = data.clone();
        client_cipher().encrypt(&mut ciphertext);
        let expected: Fingerprint = Sha1::digest(&ciphertext).into();

        assert_eq!(client.finalize_write_digest().unwrap(), expected);
        assert_eq!(server.finalize_read_digest().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_finalize_is_one_shot() {
        let (a, _b) = duplex(1024);
        let mut stream = SecureStream::with_digests(a);
        stream.write_all(b"hello").await.unwrap();

        assert!(stream.finalize_write_digest().is_ok());
        assert!(!stream.has_write_digest());
        let err = stream.finalize_write_digest().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);

        // writes after finalizing are not folded anywhere and still work
        stream.write_all(b"more").await.unwrap();
    }

    #[tokio::test]
    async fn test_release_digests_then_finalize_fails() {
        let (a, _b) = duplex(1024);
        let mut stream = SecureStream::with_digests(a);
        stream.write_all(b"handshake").await.unwrap();

        stream.release_digests();
        stream.release_digests();

        assert!(!stream.has_read_digest());
        assert!(!stream.has_write_digest());
        assert!(stream.finalize_read_digest().is_err());
        assert!(stream.finalize_write_digest().is_err());
    }

    #[tokio::test]
    async fn test_cipher_stream_has_no_digest() {
        let (a, _b) = duplex(1024);
        let mut stream = SecureStream::with_cipher(a, client_cipher());
        assert!(stream.finalize_read_digest().is_err());
        assert!(stream.finalize_write_digest().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_deadline_expires() {
        let (a, mut b) = duplex(1024);
        let mut stream = SecureStream::new(a);
        stream.set_read_deadline(Deadline::after(Duration::from_secs(5)));

        let mut buf = [0u8; 16];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        stream.configure_socket(SocketOptions::from_tristate(1, -1, -1));
        assert_eq!(stream.read_deadline(), Deadline::Unbounded);

        b.write_all(b"late").await.unwrap();
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_deadline_expires() {
        let (a, _b) = duplex(4);
        let mut stream = SecureStream::new(a);
        stream.set_write_deadline(Deadline::after(Duration::from_secs(1)));

        // the duplex buffer fills and the remaining write blocks until the deadline
        let err = stream.write_all(&[0u8; 64]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_close_write_signals_eof() {
        let (a, b) = duplex(1024);
        let mut client = SecureStream::with_cipher(a, client_cipher());
        let mut server = SecureStream::with_cipher(b, server_cipher());

        client.write_all(b"bye").await.unwrap();
        client.close_write().await.unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");
    }

    #[tokio::test]
    async fn test_identifier() {
        let (a, _b) = duplex(16);
        let mut stream = SecureStream::new(a);
        assert_eq!(stream.identifier(), UNKNOWN_IDENTITY);

        stream.set_identifier("client:1");
        assert_eq!(stream.identifier(), "client:1");

        let (client, server) = tcp_pair().await;
        let expected = client.local_addr().unwrap().to_string();
        let stream = SecureStream::new(server);
        assert_eq!(stream.identifier(), expected);
        drop(client);
    }

    #[tokio::test]
    async fn test_configure_tcp_socket() {
        let (client, server) = tcp_pair().await;
        let mut stream = SecureStream::new(server);

        stream.configure_socket(SocketOptions::from_tristate(-1, 1, 1));
        assert!(socket2::SockRef::from(stream.get_ref()).keepalive().unwrap());
        assert!(stream.get_ref().nodelay().unwrap());

        stream.configure_socket(SocketOptions::from_tristate(-1, 0, 0));
        assert!(!socket2::SockRef::from(stream.get_ref()).keepalive().unwrap());
        assert!(!stream.get_ref().nodelay().unwrap());

        // unchanged leaves the previous value alone
        stream.configure_socket(SocketOptions::from_tristate(-1, -1, -1));
        assert!(!stream.get_ref().nodelay().unwrap());
        drop(client);
    }

    #[tokio::test]
    async fn test_close_read_unsupported_is_noop() {
        let (a, _b) = duplex(16);
        let stream = SecureStream::new(a);
        assert!(stream.close_read().is_ok());
    }

    #[tokio::test]
    async fn test_close_sends_eof_to_peer() {
        let (client, server) = tcp_pair().await;
        let mut peer = SecureStream::new(client);
        let stream = SecureStream::new(server);

        stream.close().await.unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(peer.read(&mut buf).await.unwrap(), 0);
    }

    #[test]
    fn test_toggle_from_tristate() {
        assert_eq!(Toggle::from(-1i8), Toggle::Unchanged);
        assert_eq!(Toggle::from(0i8), Toggle::Disable);
        assert_eq!(Toggle::from(3i8), Toggle::Enable);

        let options = SocketOptions::from_tristate(0, 1, -1);
        assert!(!options.clear_deadline);
        assert_eq!(options.keep_alive, Toggle::Enable);
        assert_eq!(options.no_delay, Toggle::Unchanged);
    }
}
