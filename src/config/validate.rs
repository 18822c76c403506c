//! Configuration validation - turns raw tunnel configs into startable ones.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use super::types::{Role, TcpConfig, TunnelConfig};
use crate::stream_cipher::CipherMethod;

/// Cipher settings for the sealed leg, with the key already derived.
#[derive(Clone)]
pub struct SealConfig {
    pub method: CipherMethod,
    pub key: Vec<u8>,
    pub role: Role,
}

impl fmt::Debug for SealConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealConfig")
            .field("method", &self.method)
            .field("key", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TunnelServerConfig {
    pub bind: SocketAddr,
    pub target: String,
    pub seal: Option<SealConfig>,
    pub tcp: TcpConfig,
    pub handshake_timeout: Duration,
}

fn invalid(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, message)
}

fn validate_target(target: &str) -> std::io::Result<()> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| invalid(format!("target {target} is missing a port")))?;
    if host.is_empty() {
        return Err(invalid(format!("target {target} is missing a host")));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid(format!("target {target} has an invalid port"))),
        Ok(_) => Ok(()),
    }
}

fn create_tunnel_config(config: TunnelConfig) -> std::io::Result<TunnelServerConfig> {
    let TunnelConfig {
        bind,
        target,
        cipher,
        tcp,
        handshake_timeout_secs,
    } = config;

    validate_target(&target)?;

    if handshake_timeout_secs == 0 {
        return Err(invalid(format!(
            "handshake_timeout_secs for {bind} must be positive"
        )));
    }

    let seal = match cipher {
        None => None,
        Some(cipher) => {
            let method = CipherMethod::try_from(cipher.method.as_str())?;
            if cipher.password.is_empty() {
                return Err(invalid(format!("cipher password for {bind} is empty")));
            }
            Some(SealConfig {
                method,
                key: method.derive_key(&cipher.password),
                role: cipher.role,
            })
        }
    };

    Ok(TunnelServerConfig {
        bind,
        target,
        seal,
        tcp,
        handshake_timeout: Duration::from_secs(handshake_timeout_secs),
    })
}

/// Validates every tunnel config, rejecting duplicate bind addresses.
pub fn create_tunnel_configs(
    configs: Vec<TunnelConfig>,
) -> std::io::Result<Vec<TunnelServerConfig>> {
    let mut seen_binds = HashSet::new();
    let mut server_configs = Vec::with_capacity(configs.len());
    for config in configs {
        if !seen_binds.insert(config.bind) {
            return Err(invalid(format!(
                "bind address {} is used by more than one tunnel",
                config.bind
            )));
        }
        server_configs.push(create_tunnel_config(config)?);
    }
    Ok(server_configs)
}
