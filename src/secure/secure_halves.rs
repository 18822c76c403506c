use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, ReadHalf, WriteHalf};

use super::deadline::Deadline;
use super::io_state::{Fingerprint, ReadState, WriteState};

/// Read half of a split `SecureStream`. Owns the decryptor and read digest.
pub struct SecureReadHalf<S> {
    stream: ReadHalf<S>,
    state: ReadState,
    identifier: Arc<str>,
}

impl<S> SecureReadHalf<S> {
    pub(crate) fn new(stream: ReadHalf<S>, state: ReadState, identifier: Arc<str>) -> Self {
        Self {
            stream,
            state,
            identifier,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn set_read_deadline(&mut self, deadline: Deadline) {
        self.state.set_deadline(deadline);
    }

    pub fn release_digest(&mut self) {
        self.state.release_digest();
    }

    pub fn finalize_digest(&mut self) -> io::Result<Fingerprint> {
        self.state.finalize_digest()
    }
}

impl<S: AsyncRead> AsyncRead for SecureReadHalf<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.state.poll_read(cx, Pin::new(&mut this.stream), buf)
    }
}

/// Write half of a split `SecureStream`. Owns the encryptor and write digest.
pub struct SecureWriteHalf<S> {
    stream: WriteHalf<S>,
    state: WriteState,
    identifier: Arc<str>,
}

impl<S> SecureWriteHalf<S> {
    pub(crate) fn new(stream: WriteHalf<S>, state: WriteState, identifier: Arc<str>) -> Self {
        Self {
            stream,
            state,
            identifier,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn set_write_deadline(&mut self, deadline: Deadline) {
        self.state.set_deadline(deadline);
    }

    pub fn release_digest(&mut self) {
        self.state.release_digest();
    }

    pub fn finalize_digest(&mut self) -> io::Result<Fingerprint> {
        self.state.finalize_digest()
    }
}

impl<S: AsyncWrite> AsyncWrite for SecureWriteHalf<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.state.poll_write(cx, Pin::new(&mut this.stream), buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.state.poll_flush(cx, Pin::new(&mut this.stream))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.state.poll_shutdown(cx, Pin::new(&mut this.stream))
    }
}

#[cfg(test)]
mod tests {
    use crate::secure::SecureStream;
    use crate::stream_cipher::{Cipher, CipherMethod, IV_LEN};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    #[tokio::test]
    async fn test_split_halves_keep_cipher_state() {
        let key = [9u8; 16];
        let up = [1u8; IV_LEN];
        let down = [2u8; IV_LEN];
        let client_cipher = Cipher::from_method(CipherMethod::Aes128Ctr, &key, &up, &down).unwrap();
        let server_cipher = Cipher::from_method(CipherMethod::Aes128Ctr, &key, &down, &up).unwrap();

        let (a, b) = duplex(1024);
        let mut client = SecureStream::with_cipher(a, client_cipher);
        let mut server = SecureStream::with_cipher(b, server_cipher);
        client.set_identifier("client");

        // traffic before the split advances the keystreams
        client.write_all(b"first").await.unwrap();
        client.flush().await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"first");

        let (mut client_read, mut client_write) = client.into_split();
        assert_eq!(client_read.identifier(), "client");
        assert_eq!(client_write.identifier(), "client");

        client_write.write_all(b"second").await.unwrap();
        client_write.flush().await.unwrap();
        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"second");

        server.write_all(b"reply").await.unwrap();
        server.flush().await.unwrap();
        let mut buf = [0u8; 5];
        client_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"reply");
    }

    #[tokio::test]
    async fn test_split_halves_carry_digests() {
        let (a, mut b) = duplex(1024);
        let client = SecureStream::with_digests(a);
        let (mut reader, mut writer) = client.into_split();

        writer.write_all(b"abc").await.unwrap();
        b.write_all(b"xyz").await.unwrap();
        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).await.unwrap();

        use sha1::{Digest, Sha1};
        let expected_write: [u8; 20] = Sha1::digest(b"abc").into();
        let expected_read: [u8; 20] = Sha1::digest(b"xyz").into();
        assert_eq!(writer.finalize_digest().unwrap(), expected_write);
        assert_eq!(reader.finalize_digest().unwrap(), expected_read);

        reader.release_digest();
        writer.release_digest();
        assert!(reader.finalize_digest().is_err());
        assert!(writer.finalize_digest().is_err());
    }
}
