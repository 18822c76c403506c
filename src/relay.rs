//! One-directional relay between two connections, plus the two-direction
//! session helper built on it.
//!
//! A relay never returns an error. Whatever ends it is captured in the
//! `RelayOutcome`, which is logged and handed back for observability only.

use std::fmt;
use std::io;
use std::pin::pin;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::async_stream::AsyncStream;
use crate::liveness::LivenessSink;
use crate::secure::{Deadline, SecureReadHalf, SecureStream, SecureWriteHalf};
use crate::util::human_size;

pub const RELAY_BUF_SIZE: usize = 16 * 1024;

// Minimum spacing between liveness notifications from one relay.
const LIVENESS_INTERVAL: Duration = Duration::from_secs(2);

/// Read side of a relay.
pub trait RelaySource: AsyncRead + Unpin {
    fn identifier(&self) -> String;
    fn clear_read_deadline(&mut self);
}

/// Write side of a relay.
pub trait RelayDestination: AsyncWrite + Unpin {
    fn identifier(&self) -> String;
    fn clear_write_deadline(&mut self);
}

impl<S: AsyncStream> RelaySource for SecureStream<S> {
    fn identifier(&self) -> String {
        SecureStream::identifier(self)
    }

    fn clear_read_deadline(&mut self) {
        self.set_read_deadline(Deadline::Unbounded);
    }
}

impl<S: AsyncStream> RelayDestination for SecureStream<S> {
    fn identifier(&self) -> String {
        SecureStream::identifier(self)
    }

    fn clear_write_deadline(&mut self) {
        self.set_write_deadline(Deadline::Unbounded);
    }
}

impl<S: AsyncRead> RelaySource for SecureReadHalf<S> {
    fn identifier(&self) -> String {
        SecureReadHalf::identifier(self).to_string()
    }

    fn clear_read_deadline(&mut self) {
        self.set_read_deadline(Deadline::Unbounded);
    }
}

impl<S: AsyncWrite> RelayDestination for SecureWriteHalf<S> {
    fn identifier(&self) -> String {
        SecureWriteHalf::identifier(self).to_string()
    }

    fn clear_write_deadline(&mut self) {
        self.set_write_deadline(Deadline::Unbounded);
    }
}

#[derive(Debug)]
pub enum Termination {
    /// End of stream, or the connection was already closing.
    Graceful,
    Abnormal(io::Error),
}

#[derive(Debug)]
pub struct RelayOutcome {
    pub session_id: u32,
    pub source: String,
    pub destination: String,
    pub bytes: u64,
    pub termination: Termination,
}

impl RelayOutcome {
    pub fn is_graceful(&self) -> bool {
        matches!(self.termination, Termination::Graceful)
    }

    pub fn error(&self) -> Option<&io::Error> {
        match &self.termination {
            Termination::Graceful => None,
            Termination::Abnormal(e) => Some(e),
        }
    }
}

impl fmt::Display for RelayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SID#{:X}  {} --- {} --> {}",
            self.session_id,
            self.source,
            human_size(self.bytes),
            self.destination
        )?;
        if let Termination::Abnormal(e) = &self.termination {
            write!(f, " Error={e}")?;
        }
        Ok(())
    }
}

/// Whether `e` only says that the connection was already going away.
///
/// Structured kinds are checked first. The message match covers streams that
/// report closure through a custom error.
pub fn is_closed_error(e: &io::Error) -> bool {
    match e.kind() {
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => true,
        _ => e.to_string().contains("closed"),
    }
}

fn classify(error: Option<io::Error>) -> Termination {
    match error {
        None => Termination::Graceful,
        Some(e) if is_closed_error(&e) => Termination::Graceful,
        Some(e) => Termination::Abnormal(e),
    }
}

// Forwards all of `data`. A destination that stops accepting bytes before the
// end is a short write and ends the relay; it is never retried.
async fn forward<W>(destination: &mut W, data: &[u8], written: &mut u64) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut offset = 0;
    while offset < data.len() {
        let n = destination.write(&data[offset..]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes forwarded", offset, data.len()),
            ));
        }
        offset += n;
        *written += n as u64;
    }
    destination.flush().await
}

/// Copies bytes from `source` to `destination` until end of stream or error,
/// then shuts `destination` down.
///
/// Notifies `liveness` at most once per two seconds while reads keep
/// succeeding.
pub async fn relay<W, R, L>(
    destination: &mut W,
    source: &mut R,
    session_id: u32,
    liveness: &L,
) -> RelayOutcome
where
    W: RelayDestination + ?Sized,
    R: RelaySource + ?Sized,
    L: LivenessSink + ?Sized,
{
    relay_until(
        destination,
        source,
        session_id,
        liveness,
        futures::future::pending::<()>(),
    )
    .await
}

// Same as `relay`, but a pending read is abandoned once `closed` resolves. That
// ends the direction as if the source had reached end of stream.
async fn relay_until<W, R, L, C>(
    destination: &mut W,
    source: &mut R,
    session_id: u32,
    liveness: &L,
    closed: C,
) -> RelayOutcome
where
    W: RelayDestination + ?Sized,
    R: RelaySource + ?Sized,
    L: LivenessSink + ?Sized,
    C: Future,
{
    let mut closed = pin!(closed);
    source.clear_read_deadline();
    destination.clear_write_deadline();

    let mut buf = vec![0u8; RELAY_BUF_SIZE].into_boxed_slice();
    let mut written: u64 = 0;
    let mut last_active = Instant::now();

    let error = loop {
        let read_result = tokio::select! {
            biased;
            result = source.read(&mut buf) => result,
            _ = closed.as_mut() => {
                debug!(
                    "SID#{session_id:X} {} closed by the other direction",
                    source.identifier()
                );
                Ok(0)
            }
        };
        let (n, read_error) = match read_result {
            Ok(n) => (n, None),
            Err(e) => (0, Some(e)),
        };

        if n > 0
            && let Err(e) = forward(destination, &buf[..n], &mut written).await
        {
            break Some(e);
        }

        if read_error.is_none() {
            let now = Instant::now();
            if now.duration_since(last_active) > LIVENESS_INTERVAL {
                last_active = now;
                liveness.active(now);
            }
        }

        match read_error {
            Some(e) => break Some(e),
            None if n == 0 => break None,
            None => {}
        }
    };

    if let Err(e) = destination.shutdown().await {
        debug!(
            "SID#{session_id:X} failed to close {}: {e}",
            destination.identifier()
        );
    }

    let outcome = RelayOutcome {
        session_id,
        source: source.identifier(),
        destination: destination.identifier(),
        bytes: written,
        termination: classify(error),
    };
    debug!("{outcome}");
    outcome
}

/// Relays both directions of a session concurrently until both have ended.
///
/// When one direction ends it closes its destination, and the other direction
/// stops waiting on reads from that same connection. An idle peer therefore
/// cannot keep the session open once its counterpart has gone.
///
/// Returns the `a -> b` outcome first.
pub async fn relay_pair<A, B, L>(
    a: SecureStream<A>,
    b: SecureStream<B>,
    session_id: u32,
    liveness: &L,
) -> (RelayOutcome, RelayOutcome)
where
    A: AsyncStream,
    B: AsyncStream,
    L: LivenessSink + ?Sized,
{
    let (mut a_reader, mut a_writer) = a.into_split();
    let (mut b_reader, mut b_writer) = b.into_split();

    // Fired when the direction writing into a (resp. b) has closed it.
    let (a_closed_tx, a_closed_rx) = oneshot::channel::<()>();
    let (b_closed_tx, b_closed_rx) = oneshot::channel::<()>();

    tokio::join!(
        async {
            let outcome =
                relay_until(&mut b_writer, &mut a_reader, session_id, liveness, a_closed_rx).await;
            let _ = b_closed_tx.send(());
            outcome
        },
        async {
            let outcome =
                relay_until(&mut a_writer, &mut b_reader, session_id, liveness, b_closed_rx).await;
            let _ = a_closed_tx.send(());
            outcome
        },
    )
}
