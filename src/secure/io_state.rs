// Per-direction transform pipelines shared by `SecureStream` and its split halves.
//
// Read:  transport -> digest -> decrypt -> caller
// Write: caller -> encrypt -> digest -> transport
//
// Digests always see wire-form bytes. Swapping either order breaks fingerprints
// computed by the peer.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::ready;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::deadline::{Deadline, DeadlineTimer};
use crate::stream_cipher::Keystream;

/// SHA-1 of the bytes seen by a digest accumulator.
pub type Fingerprint = [u8; 20];

fn finalize_digest(digest: &mut Option<Sha1>, direction: &str) -> io::Result<Fingerprint> {
    match digest.take() {
        Some(digest) => Ok(digest.finalize().into()),
        None => Err(io::Error::other(format!(
            "{direction} digest is not available, it was never enabled, already finalized or released"
        ))),
    }
}

#[derive(Default)]
pub(crate) struct ReadState {
    decryptor: Option<Box<dyn Keystream>>,
    digest: Option<Sha1>,
    deadline: DeadlineTimer,
}

impl ReadState {
    pub fn new(decryptor: Option<Box<dyn Keystream>>, digest: Option<Sha1>) -> Self {
        Self {
            decryptor,
            digest,
            deadline: DeadlineTimer::default(),
        }
    }

    pub fn set_deadline(&mut self, deadline: Deadline) {
        self.deadline.set(deadline);
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline.deadline()
    }

    pub fn has_digest(&self) -> bool {
        self.digest.is_some()
    }

    pub fn release_digest(&mut self) {
        self.digest = None;
    }

    pub fn finalize_digest(&mut self) -> io::Result<Fingerprint> {
        finalize_digest(&mut self.digest, "read")
    }

    pub fn poll_read<R>(
        &mut self,
        cx: &mut Context<'_>,
        reader: Pin<&mut R>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>>
    where
        R: AsyncRead + ?Sized,
    {
        if self.deadline.poll_expired(cx) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "read deadline exceeded",
            )));
        }

        let filled_before = buf.filled().len();
        ready!(reader.poll_read(cx, buf))?;

        let received = &mut buf.filled_mut()[filled_before..];
        if !received.is_empty() {
            if let Some(digest) = self.digest.as_mut() {
                digest.update(&*received);
            }
            if let Some(decryptor) = self.decryptor.as_mut() {
                decryptor.apply(received);
            }
        }

        Poll::Ready(Ok(()))
    }
}

#[derive(Default)]
pub(crate) struct WriteState {
    encryptor: Option<Box<dyn Keystream>>,
    digest: Option<Sha1>,
    deadline: DeadlineTimer,
    // Ciphertext already accepted from the caller but not yet taken by the
    // transport. Keystream state has advanced past it, so it can never be
    // dropped or re-encrypted.
    pending: Vec<u8>,
    pending_offset: usize,
}

impl WriteState {
    pub fn new(encryptor: Option<Box<dyn Keystream>>, digest: Option<Sha1>) -> Self {
        Self {
            encryptor,
            digest,
            ..Default::default()
        }
    }

    pub fn set_deadline(&mut self, deadline: Deadline) {
        self.deadline.set(deadline);
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline.deadline()
    }

    pub fn has_digest(&self) -> bool {
        self.digest.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.pending_offset < self.pending.len()
    }

    pub fn release_digest(&mut self) {
        self.digest = None;
    }

    pub fn finalize_digest(&mut self) -> io::Result<Fingerprint> {
        finalize_digest(&mut self.digest, "write")
    }

    fn poll_deadline(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        if self.deadline.poll_expired(cx) {
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "write deadline exceeded",
            ))
        } else {
            Ok(())
        }
    }

    fn poll_drain<W>(&mut self, cx: &mut Context<'_>, mut writer: Pin<&mut W>) -> Poll<io::Result<()>>
    where
        W: AsyncWrite + ?Sized,
    {
        while self.pending_offset < self.pending.len() {
            let written =
                ready!(writer.as_mut().poll_write(cx, &self.pending[self.pending_offset..]))?;
            if written == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write zero byte into writer",
                )));
            }
            self.pending_offset += written;
        }
        self.pending.clear();
        self.pending_offset = 0;
        Poll::Ready(Ok(()))
    }

    pub fn poll_write<W>(
        &mut self,
        cx: &mut Context<'_>,
        mut writer: Pin<&mut W>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>>
    where
        W: AsyncWrite + ?Sized,
    {
        self.poll_deadline(cx)?;

        if self.encryptor.is_none() {
            let written = ready!(writer.poll_write(cx, buf))?;
            if let Some(digest) = self.digest.as_mut() {
                digest.update(&buf[..written]);
            }
            return Poll::Ready(Ok(written));
        }

        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        // Earlier ciphertext must go out first to keep the wire order.
        ready!(self.poll_drain(cx, writer.as_mut()))?;

        self.pending.extend_from_slice(buf);
        if let Some(encryptor) = self.encryptor.as_mut() {
            encryptor.apply(&mut self.pending);
        }
        if let Some(digest) = self.digest.as_mut() {
            digest.update(&self.pending);
        }

        // The whole buffer is accepted at this point. Whatever the transport does
        // not take now is pushed out by the next write, flush or shutdown.
        if let Poll::Ready(Err(e)) = self.poll_drain(cx, writer) {
            return Poll::Ready(Err(e));
        }
        Poll::Ready(Ok(buf.len()))
    }

    pub fn poll_flush<W>(&mut self, cx: &mut Context<'_>, mut writer: Pin<&mut W>) -> Poll<io::Result<()>>
    where
        W: AsyncWrite + ?Sized,
    {
        self.poll_deadline(cx)?;
        ready!(self.poll_drain(cx, writer.as_mut()))?;
        writer.poll_flush(cx)
    }

    pub fn poll_shutdown<W>(
        &mut self,
        cx: &mut Context<'_>,
        mut writer: Pin<&mut W>,
    ) -> Poll<io::Result<()>>
    where
        W: AsyncWrite + ?Sized,
    {
        ready!(self.poll_drain(cx, writer.as_mut()))?;
        writer.poll_shutdown(cx)
    }
}
