//! Field encryption seam for the persistence layer.
//!
//! Storage code holds an `Arc<dyn FieldEncryptor>` and never touches keys.
//! [`SessionEncryptor`] routes every call through the calling thread's
//! current session, so the same store instance can serve many users as long
//! as each request runs inside its own session.

use crate::error::CryptoResult;
use crate::session::Session;

pub trait FieldEncryptor: Send + Sync {
    /// Encrypts an optional field. `None` stays `None`.
    fn encrypt_field(&self, plaintext: Option<&[u8]>) -> CryptoResult<Option<Vec<u8>>>;

    fn decrypt_field(&self, ciphertext: Option<&[u8]>) -> CryptoResult<Option<Vec<u8>>>;

    /// Whether encryption can happen right now on this thread.
    fn is_available(&self) -> bool;
}

/// Uses [`Session::current`]; fails with `NoActiveSession` outside a session.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionEncryptor;

impl FieldEncryptor for SessionEncryptor {
    fn encrypt_field(&self, plaintext: Option<&[u8]>) -> CryptoResult<Option<Vec<u8>>> {
        match plaintext {
            None => Ok(None),
            Some(p) => Session::current()?.encrypt(p).map(Some),
        }
    }

    fn decrypt_field(&self, ciphertext: Option<&[u8]>) -> CryptoResult<Option<Vec<u8>>> {
        match ciphertext {
            None => Ok(None),
            Some(c) => Session::current()?.decrypt(c).map(Some),
        }
    }

    fn is_available(&self) -> bool {
        Session::current().is_ok()
    }
}

/// Stores fields as-is. For non-private fields and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughEncryptor;

impl FieldEncryptor for PassthroughEncryptor {
    fn encrypt_field(&self, plaintext: Option<&[u8]>) -> CryptoResult<Option<Vec<u8>>> {
        Ok(plaintext.map(<[u8]>::to_vec))
    }

    fn decrypt_field(&self, ciphertext: Option<&[u8]>) -> CryptoResult<Option<Vec<u8>>> {
        Ok(ciphertext.map(<[u8]>::to_vec))
    }

    fn is_available(&self) -> bool {
        true
    }
}
