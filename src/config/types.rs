//! Raw configuration types, as read from YAML.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

pub fn default_true() -> bool {
    true
}

pub fn default_handshake_timeout_secs() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_SECS
}

/// Which end of the sealed leg this tunnel is.
///
/// A client tunnel encrypts towards its target; a server tunnel decrypts what
/// arrives on its bind address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Server,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CipherConfig {
    pub method: String,
    pub password: String,
    pub role: Role,
}

// Configs are dumped at debug level on startup.
impl fmt::Debug for CipherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherConfig")
            .field("method", &self.method)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TcpConfig {
    #[serde(default = "default_true")]
    pub no_delay: bool,
    #[serde(default = "default_true")]
    pub keep_alive: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            no_delay: true,
            keep_alive: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TunnelConfig {
    pub bind: SocketAddr,
    /// `host:port` of the upstream; resolved at connect time.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher: Option<CipherConfig>,
    #[serde(default)]
    pub tcp: TcpConfig,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}
