//! sealpipe - an encrypting TCP tunnel.
//!
//! The crate is built from a few layers:
//!
//! - [`secure::SecureStream`]: wraps any byte stream with an optional AES-CTR
//!   cipher, optional SHA-1 digests of the raw wire bytes, and per-direction
//!   deadlines. It can be split into read and write halves.
//! - [`relay::relay`]: pumps one direction of a connection pair, reporting
//!   activity to a [`liveness::LivenessSink`] at most every couple of seconds
//!   and classifying how the transfer ended.
//! - [`handshake::seal_stream`]: exchanges IVs with the peer and returns the
//!   stream re-wrapped with the negotiated cipher plus a session fingerprint.
//! - [`tunnel_server`]: accepts connections, dials the target, seals the
//!   configured leg and relays both directions.
//!
//! # Example config
//!
//! ```yaml
//! - bind: 127.0.0.1:9000
//!   target: tunnel-exit.example.com:9001
//!   cipher:
//!     method: aes-256-ctr
//!     password: correct horse battery staple
//!     role: client
//! ```

pub mod async_stream;
pub mod config;
pub mod handshake;
pub mod liveness;
pub mod relay;
pub mod secure;
mod socket_util;
pub mod stream_cipher;
pub mod tunnel_server;
mod util;

pub use liveness::{ActivityTracker, LivenessSink};
pub use relay::{RelayOutcome, Termination, relay, relay_pair};
pub use secure::{Deadline, SecureStream, SocketOptions};
pub use stream_cipher::{Cipher, CipherMethod};
