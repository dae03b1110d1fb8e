//! Password-based key derivation and symmetric key material.

use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key length in bytes (AES-128).
pub const KEY_SIZE: usize = 16;

/// PBKDF2 iteration count used unless configuration overrides it.
pub const DEFAULT_ITERATIONS: u32 = 310_000;

/// Application-wide salt. Keys are re-derived for every operation and never
/// stored, so the salt has to be the same for every derivation.
pub const DEFAULT_SALT: &[u8; 16] = b"tandem-kdf-salt1";

/// A raw symmetric key. Zeroized on drop; `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a key from a slice, rejecting anything that is not exactly
    /// [`KEY_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// PBKDF2-HMAC-SHA256 parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdfParams {
    pub iterations: u32,
    pub salt: Vec<u8>,
}

impl KdfParams {
    pub fn new(iterations: u32, salt: impl Into<Vec<u8>>) -> Self {
        Self {
            iterations,
            salt: salt.into(),
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            salt: DEFAULT_SALT.to_vec(),
        }
    }
}

/// Derives a symmetric key from a password.
///
/// Deterministic: the same password and parameters always give the same key.
/// This is intentionally slow and runs on the calling thread.
pub fn derive_key(password: &[u8], params: &KdfParams) -> CryptoResult<SymmetricKey> {
    if password.is_empty() {
        return Err(CryptoError::MissingCredential);
    }
    if params.iterations == 0 {
        return Err(CryptoError::OperationFailed(
            "KDF iteration count must be non-zero".to_string(),
        ));
    }
    if params.salt.is_empty() {
        return Err(CryptoError::OperationFailed("KDF salt must not be empty".to_string()));
    }

    let mut out = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, &params.salt, params.iterations, &mut out);
    let key = SymmetricKey(out);
    out.zeroize();
    Ok(key)
}

/// Generates a random key for ephemeral sessions.
pub fn generate_random_key() -> SymmetricKey {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    let key = SymmetricKey(bytes);
    bytes.zeroize();
    key
}
