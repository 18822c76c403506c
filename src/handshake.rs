// IV exchange run on the sealed leg of a tunnel before the relay starts.
//
// Each side sends a fresh random IV for its own encryptor and reads the peer's
// IV for its decryptor. The exchange runs through a digesting wrapper; the SHA-1
// of the client-to-server bytes is the session fingerprint both sides agree on.

use std::io;
use std::time::Duration;

use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::async_stream::AsyncStream;
use crate::config::Role;
use crate::secure::{Deadline, Fingerprint, SecureStream};
use crate::stream_cipher::{Cipher, CipherMethod, IV_LEN};

pub struct SealParams<'a> {
    pub method: CipherMethod,
    pub key: &'a [u8],
    pub role: Role,
    pub timeout: Duration,
}

/// Runs the IV exchange on `stream` and returns it wrapped with the negotiated
/// cipher, along with the session fingerprint.
pub async fn seal_stream<S>(
    stream: S,
    params: &SealParams<'_>,
) -> io::Result<(SecureStream<S>, Fingerprint)>
where
    S: AsyncStream,
{
    let mut handshake = SecureStream::with_digests(stream);
    handshake.set_deadline(Deadline::after(params.timeout));

    let mut encrypt_iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut encrypt_iv);

    handshake.write_all(&encrypt_iv).await?;
    handshake.flush().await?;

    let mut decrypt_iv = [0u8; IV_LEN];
    handshake.read_exact(&mut decrypt_iv).await.map_err(|e| {
        io::Error::new(e.kind(), format!("failed to read peer iv: {e}"))
    })?;

    if decrypt_iv == encrypt_iv {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "peer echoed our iv back",
        ));
    }

    let fingerprint = match params.role {
        Role::Client => handshake.finalize_write_digest()?,
        Role::Server => handshake.finalize_read_digest()?,
    };
    handshake.release_digests();

    let cipher = Cipher::from_method(params.method, params.key, &encrypt_iv, &decrypt_iv)?;
    Ok((SecureStream::with_cipher(handshake.into_inner(), cipher), fingerprint))
}
