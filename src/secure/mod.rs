// Connection wrapper adding an optional stream cipher and optional wire digests
// on top of a raw duplex stream.

mod deadline;
mod io_state;
mod secure_halves;
mod secure_stream;

pub use deadline::Deadline;
pub use io_state::Fingerprint;
pub use secure_halves::{SecureReadHalf, SecureWriteHalf};
pub use secure_stream::{SecureStream, SocketOptions, Toggle};
