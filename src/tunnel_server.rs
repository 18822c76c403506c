use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, error, info};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::{Role, TunnelServerConfig};
use crate::handshake::{SealParams, seal_stream};
use crate::liveness::ActivityTracker;
use crate::relay::{Termination, relay_pair};
use crate::secure::{Fingerprint, SecureStream, SocketOptions};
use crate::socket_util::new_tcp_listener;
use crate::util::{hex_string, human_size};

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Binds the tunnel's listener and spawns its accept loop. Returns the bound
/// address, which differs from the configured one when port 0 was requested.
pub async fn start_tunnel_server(
    config: TunnelServerConfig,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = new_tcp_listener(config.bind, 4096)?;
    let local_addr = listener.local_addr()?;

    info!(
        "Tunnel listening on {local_addr} -> {} ({})",
        config.target,
        match &config.seal {
            None => "plain".to_string(),
            Some(seal) => format!("{} {:?}", seal.method, seal.role),
        }
    );

    let config = Arc::new(config);
    let handle = tokio::spawn(run_tunnel_server(listener, config));
    Ok((local_addr, handle))
}

async fn run_tunnel_server(listener: TcpListener, config: Arc<TunnelServerConfig>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                error!("Accept failed: {e}");
                continue;
            }
        };

        let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let cloned_config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = process_stream(stream, addr, session_id, &cloned_config).await {
                error!("SID#{session_id:X} {addr} finished with error: {e}");
            } else {
                debug!("SID#{session_id:X} {addr} finished successfully");
            }
        });
    }
}

async fn connect_target(config: &TunnelServerConfig) -> std::io::Result<TcpStream> {
    match timeout(
        config.handshake_timeout,
        TcpStream::connect(config.target.as_str()),
    )
    .await
    {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(std::io::Error::new(
            e.kind(),
            format!("failed to connect to {}: {e}", config.target),
        )),
        Err(elapsed) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("connect to {} timed out: {elapsed}", config.target),
        )),
    }
}

fn log_fingerprint(session_id: u32, fingerprint: &Fingerprint) {
    debug!(
        "SID#{session_id:X} session fingerprint {}",
        hex_string(fingerprint)
    );
}

async fn process_stream(
    inbound: TcpStream,
    addr: SocketAddr,
    session_id: u32,
    config: &TunnelServerConfig,
) -> std::io::Result<()> {
    let outbound = connect_target(config).await?;

    let (mut inbound, mut outbound) = match &config.seal {
        None => (SecureStream::new(inbound), SecureStream::new(outbound)),
        Some(seal) => {
            let params = SealParams {
                method: seal.method,
                key: &seal.key,
                role: seal.role,
                timeout: config.handshake_timeout,
            };
            match seal.role {
                Role::Client => {
                    let (outbound, fingerprint) = seal_stream(outbound, &params).await?;
                    log_fingerprint(session_id, &fingerprint);
                    (SecureStream::new(inbound), outbound)
                }
                Role::Server => {
                    let (inbound, fingerprint) = seal_stream(inbound, &params).await?;
                    log_fingerprint(session_id, &fingerprint);
                    (inbound, SecureStream::new(outbound))
                }
            }
        }
    };

    inbound.set_identifier(format!("client:{addr}"));
    outbound.set_identifier(format!("target:{}", config.target));

    let options = SocketOptions {
        clear_deadline: true,
        keep_alive: config.tcp.keep_alive.into(),
        no_delay: config.tcp.no_delay.into(),
    };
    inbound.configure_socket(options);
    outbound.configure_socket(options);

    let tracker = ActivityTracker::new();
    let (upstream, downstream) = relay_pair(inbound, outbound, session_id, &tracker).await;

    info!(
        "SID#{session_id:X} {addr} closed: {} up, {} down, idle {:.1}s",
        human_size(upstream.bytes),
        human_size(downstream.bytes),
        tracker.idle_for().as_secs_f64()
    );

    // Abnormal terminations were already logged by the relay; surface the
    // first one so the accept loop reports the session as failed.
    match (upstream.termination, downstream.termination) {
        (Termination::Abnormal(e), _) | (Termination::Graceful, Termination::Abnormal(e)) => Err(e),
        (Termination::Graceful, Termination::Graceful) => Ok(()),
    }
}
