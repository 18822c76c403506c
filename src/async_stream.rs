use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

use crate::socket_util::{set_tcp_keepalive, shutdown_tcp_read};

/// A raw duplex byte stream that can be handed to a `SecureStream`.
///
/// Read-side half-close and the socket toggles are optional capabilities. The
/// default implementations do nothing and report success, so transports without
/// those knobs are simply left alone.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    fn shutdown_read(&self) -> io::Result<()> {
        Ok(())
    }

    fn set_keepalive(&self, _enabled: bool) -> io::Result<()> {
        Ok(())
    }

    fn set_nodelay(&self, _enabled: bool) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncStream for TcpStream {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn shutdown_read(&self) -> io::Result<()> {
        shutdown_tcp_read(self)
    }

    fn set_keepalive(&self, enabled: bool) -> io::Result<()> {
        set_tcp_keepalive(self, enabled)
    }

    fn set_nodelay(&self, enabled: bool) -> io::Result<()> {
        TcpStream::set_nodelay(self, enabled)
    }
}

impl AsyncStream for DuplexStream {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "in-memory stream has no peer address",
        ))
    }
}

// pattern copied from deref_async_read macro: https://docs.rs/tokio/latest/src/tokio/io/async_read.rs.html#60
impl<T: ?Sized + AsyncStream> AsyncStream for Box<T> {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        (**self).peer_addr()
    }

    fn shutdown_read(&self) -> io::Result<()> {
        (**self).shutdown_read()
    }

    fn set_keepalive(&self, enabled: bool) -> io::Result<()> {
        (**self).set_keepalive(enabled)
    }

    fn set_nodelay(&self, enabled: bool) -> io::Result<()> {
        (**self).set_nodelay(enabled)
    }
}
