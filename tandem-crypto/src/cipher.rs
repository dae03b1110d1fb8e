//! AES-128-CBC with PKCS#7 padding.
//!
//! Each call builds its own transform; the session layer decides which IV
//! goes in.

use crate::error::{CryptoError, CryptoResult};
use crate::key::SymmetricKey;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroize;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// IV length in bytes (one AES block).
pub const IV_SIZE: usize = 16;

/// A CBC initialization vector.
#[derive(Clone, Copy, PartialEq, Eq, Zeroize)]
pub struct Iv([u8; IV_SIZE]);

impl Iv {
    pub fn random() -> Self {
        let mut bytes = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Reads an IV out of untrusted input; a wrong length is a decryption failure.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; IV_SIZE] = bytes.try_into().map_err(|_| CryptoError::DecryptionFailed)?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Iv(..)")
    }
}

pub(crate) fn encrypt_cbc(key: &SymmetricKey, iv: &Iv, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let transform = Aes128CbcEnc::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|e| CryptoError::OperationFailed(format!("cipher init failed: {e}")))?;
    Ok(transform.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

pub(crate) fn decrypt_cbc(key: &SymmetricKey, iv: &Iv, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    let transform = Aes128CbcDec::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|_| CryptoError::DecryptionFailed)?;
    transform
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}
