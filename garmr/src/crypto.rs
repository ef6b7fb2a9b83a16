//! Seam to the symmetric-crypto provider.
//!
//! The request builder never touches a cipher directly. It asks a
//! [CryptoBackend] which key and encryption types it supports, how large a
//! ciphertext will be, and for a [PreparedKey] it can feed plaintext to.
//! Key preprocessing (schedules, derived keys) lives behind [PreparedKey];
//! dropping the value releases whatever the preprocessing allocated.

use crate::creds::{EType, KeyType, Keyblock};

/// Error kind for crypto operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key material has invalid length {0}")]
    BadKeyLength(usize),

    #[error("output buffer too small: need {need} bytes, found {have}")]
    OutputTooSmall { need: usize, have: usize },

    #[error("encryption failed: {0}")]
    EncryptionFailed(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A key that went through algorithm-specific preprocessing and is ready to
/// encrypt. Dropping it releases the derived material.
pub trait PreparedKey {
    /// Encrypt `plain` into `cipher_out`. `plain` must already be padded to
    /// the length reported by [CryptoBackend::ciphertext_len]; `cipher_out`
    /// must be at least that long. `block_no` selects the starting cipher
    /// block for algorithms that care.
    fn encrypt(&self, plain: &[u8], cipher_out: &mut [u8], block_no: u64) -> Result<(), Error>;
}

/// The set of cryptographic services the request builder consumes.
pub trait CryptoBackend {
    /// Whether keys of this type can be used at all.
    fn supports_keytype(&self, keytype: KeyType) -> bool;

    /// The encryption type used for a key that does not pin one.
    fn default_etype(&self, keytype: KeyType) -> EType;

    /// Whether this encryption type is implemented.
    fn supports_etype(&self, etype: EType) -> bool;

    /// Ciphertext length for a plaintext of `plain_len` bytes, including
    /// padding to the algorithm's block size. Never less than `plain_len`;
    /// the request builder panics on a backend that underreports here.
    fn ciphertext_len(&self, etype: EType, plain_len: usize) -> usize;

    /// Run key preprocessing for `etype`, yielding a key ready to encrypt.
    fn prepare_key(&self, etype: EType, key: &Keyblock) -> Result<Box<dyn PreparedKey>, Error>;

    /// Generate a fresh random subkey suitable for use alongside `base`.
    fn generate_subkey(&self, base: &Keyblock) -> Result<Keyblock, Error>;

    /// Fill `buf` with bytes from a cryptographically secure source.
    fn fill_random(&self, buf: &mut [u8]) -> Result<(), Error>;
}
