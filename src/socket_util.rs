use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

const KEEPALIVE_IDLE: Duration = Duration::from_secs(300);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

#[inline]
pub fn new_tcp_listener(bind_address: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let tcp_socket = if bind_address.is_ipv6() {
        TcpSocket::new_v6()?
    } else {
        TcpSocket::new_v4()?
    };

    tcp_socket.set_reuseaddr(true)?;
    tcp_socket.bind(bind_address)?;
    tcp_socket.listen(backlog)
}

pub fn set_tcp_keepalive(stream: &TcpStream, enabled: bool) -> std::io::Result<()> {
    let sock_ref = SockRef::from(stream);
    if !enabled {
        return sock_ref.set_keepalive(false);
    }

    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_IDLE);

    #[cfg(any(
        target_os = "android",
        target_os = "freebsd",
        target_os = "fuchsia",
        target_os = "ios",
        target_os = "linux",
        target_os = "macos",
        target_os = "windows",
    ))]
    let keepalive = keepalive.with_interval(KEEPALIVE_INTERVAL);

    sock_ref.set_tcp_keepalive(&keepalive)
}

pub fn shutdown_tcp_read(stream: &TcpStream) -> std::io::Result<()> {
    SockRef::from(stream).shutdown(Shutdown::Read)
}
