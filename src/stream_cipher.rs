use std::fmt;
use std::io;

use ctr::cipher::{KeyIvInit, StreamCipher};
use sha2::{Digest, Sha256};

pub const IV_LEN: usize = 16;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// A stateful in-place byte transform. State advances with every byte processed,
/// so splitting the input across calls never changes the output.
pub trait Keystream: Send {
    fn apply(&mut self, buf: &mut [u8]);
}

impl<T: StreamCipher + Send> Keystream for T {
    fn apply(&mut self, buf: &mut [u8]) {
        self.apply_keystream(buf);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMethod {
    Aes128Ctr,
    Aes256Ctr,
}

impl CipherMethod {
    pub fn key_len(&self) -> usize {
        match self {
            CipherMethod::Aes128Ctr => 16,
            CipherMethod::Aes256Ctr => 32,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CipherMethod::Aes128Ctr => "aes-128-ctr",
            CipherMethod::Aes256Ctr => "aes-256-ctr",
        }
    }

    /// Derives a key of `key_len()` bytes from a configured password.
    pub fn derive_key(&self, password: &str) -> Vec<u8> {
        let digest: [u8; 32] = Sha256::digest(password.as_bytes()).into();
        digest[..self.key_len()].to_vec()
    }

    fn new_keystream(&self, key: &[u8], iv: &[u8]) -> io::Result<Box<dyn Keystream>> {
        let keystream: Box<dyn Keystream> = match self {
            CipherMethod::Aes128Ctr => Box::new(
                Aes128Ctr::new_from_slices(key, iv).map_err(|e| invalid_key(self, e))?,
            ),
            CipherMethod::Aes256Ctr => Box::new(
                Aes256Ctr::new_from_slices(key, iv).map_err(|e| invalid_key(self, e))?,
            ),
        };
        Ok(keystream)
    }
}

fn invalid_key(method: &CipherMethod, e: impl fmt::Display) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!(
            "invalid key or iv for {} (expected {} byte key, {IV_LEN} byte iv): {e}",
            method.name(),
            method.key_len()
        ),
    )
}

impl TryFrom<&str> for CipherMethod {
    type Error = io::Error;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        match name {
            "aes-128-ctr" => Ok(CipherMethod::Aes128Ctr),
            "aes-256-ctr" => Ok(CipherMethod::Aes256Ctr),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown cipher method: {name}"),
            )),
        }
    }
}

impl fmt::Display for CipherMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encrypt and decrypt keystreams for one connection.
///
/// The two directions are independent, which is what lets a connection be split
/// into a read half holding the decryptor and a write half holding the encryptor.
pub struct Cipher {
    encryptor: Box<dyn Keystream>,
    decryptor: Box<dyn Keystream>,
}

impl Cipher {
    pub fn new(encryptor: Box<dyn Keystream>, decryptor: Box<dyn Keystream>) -> Self {
        Self {
            encryptor,
            decryptor,
        }
    }

    pub fn from_method(
        method: CipherMethod,
        key: &[u8],
        encrypt_iv: &[u8],
        decrypt_iv: &[u8],
    ) -> io::Result<Self> {
        Ok(Self::new(
            method.new_keystream(key, encrypt_iv)?,
            method.new_keystream(key, decrypt_iv)?,
        ))
    }

    pub fn encrypt(&mut self, buf: &mut [u8]) {
        self.encryptor.apply(buf);
    }

    pub fn decrypt(&mut self, buf: &mut [u8]) {
        self.decryptor.apply(buf);
    }

    pub fn into_parts(self) -> (Box<dyn Keystream>, Box<dyn Keystream>) {
        (self.encryptor, self.decryptor)
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}
