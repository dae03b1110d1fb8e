//! A principal's recipient keypair with the private half stored encrypted
//! under that principal's password session.
//!
//! This is how a buddy gets the private key for
//! [`unwrap_and_run`](crate::disclosure::unwrap_and_run): sign in with the
//! password, unlock the stored key, open the disclosure.

use crate::asymmetric::{OaepDigest, RecipientKeyPair, RecipientPrivateKey, RecipientPublicKey};
use crate::error::{CryptoError, CryptoResult};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedKeyPair {
    #[serde(with = "crate::encoding::base64_bytes")]
    public_key_der: Vec<u8>,
    /// Session ciphertext of the PKCS#8 DER private key.
    #[serde(with = "crate::encoding::base64_bytes")]
    encrypted_private_key: Vec<u8>,
    digest: OaepDigest,
}

impl ProtectedKeyPair {
    /// Encrypts `pair`'s private key under `session`.
    pub fn protect(session: &Session, pair: &RecipientKeyPair) -> CryptoResult<Self> {
        let der = pair.private.to_pkcs8_der()?;
        Ok(Self {
            public_key_der: pair.public.to_der()?,
            encrypted_private_key: session.encrypt(&der)?,
            digest: pair.private.digest(),
        })
    }

    pub fn public_key(&self) -> CryptoResult<RecipientPublicKey> {
        RecipientPublicKey::from_der(&self.public_key_der, self.digest)
    }

    /// Decrypts the private key. A session with the wrong key fails with
    /// [`CryptoError::DecryptionFailed`], even when CBC padding happens to
    /// check out.
    pub fn unlock(&self, session: &Session) -> CryptoResult<RecipientPrivateKey> {
        let der = Zeroizing::new(session.decrypt(&self.encrypted_private_key)?);
        let private = RecipientPrivateKey::from_pkcs8_der(&der, self.digest)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        if private.public_key().to_der()? != self.public_key_der {
            return Err(CryptoError::DecryptionFailed);
        }
        Ok(private)
    }

    /// Whether `session` holds the key this pair was protected with.
    /// Suitable as the check passed to [`Session::start_verified`].
    pub fn accepts(&self, session: &Session) -> bool {
        self.unlock(session).is_ok()
    }

    /// Re-encrypts the private key under a different session, e.g. after a
    /// password change.
    pub fn reprotect(&self, old: &Session, new: &Session) -> CryptoResult<Self> {
        let private = self.unlock(old)?;
        let der = private.to_pkcs8_der()?;
        Ok(Self {
            public_key_der: self.public_key_der.clone(),
            encrypted_private_key: new.encrypt(&der)?,
            digest: self.digest,
        })
    }
}
