//! Deferred disclosure: ciphertext a different principal can read later
//! without the writer's password.
//!
//! The writer encrypts under an ephemeral session with a random key, then
//! seals that session's `IV ‖ key` for the recipient. The sealed info is the
//! only extra artifact stored next to the ciphertext. The recipient opens it
//! with their private key and decrypts inside a session started from the
//! recovered key.

use crate::asymmetric::{self, RecipientPrivateKey, RecipientPublicKey};
use crate::error::CryptoResult;
use crate::key::generate_random_key;
use crate::session::{DecryptionInfo, Session};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

/// Sealed `IV ‖ key` for one recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedInfo(#[serde(with = "crate::encoding::base64_bytes")] Vec<u8>);

impl WrappedInfo {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Asymmetric variant byte, if any.
    pub fn variant(&self) -> Option<u8> {
        self.0.first().copied()
    }
}

/// A single disclosed payload: the session ciphertext plus its wrapped info.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disclosure {
    #[serde(with = "crate::encoding::base64_bytes")]
    pub ciphertext: Vec<u8>,
    pub wrapped_info: WrappedInfo,
}

/// Runs `producer` inside a fresh ephemeral session and returns its output
/// together with that session's decryption info sealed for `recipient`.
///
/// The producer may encrypt any number of fields; all of them share the
/// session's IV and key, so one [`WrappedInfo`] unlocks them all.
pub fn wrap_for_recipient<T, F>(
    recipient: &RecipientPublicKey,
    producer: F,
) -> CryptoResult<(T, WrappedInfo)>
where
    F: FnOnce(&Session) -> CryptoResult<T>,
{
    let session = Session::start_with_key(generate_random_key());
    let produced = producer(&*session)?;
    let wrapped = asymmetric::seal(recipient, &session.decryption_info().to_bytes())?;
    debug!(wrapped_len = wrapped.len(), "wrapped decryption info for recipient");
    Ok((produced, WrappedInfo(wrapped)))
}

/// Opens `wrapped` with `recipient` and runs `consumer` inside a session
/// holding the recovered key and IV.
pub fn unwrap_and_run<T, F>(
    recipient: &RecipientPrivateKey,
    wrapped: &WrappedInfo,
    consumer: F,
) -> CryptoResult<T>
where
    F: FnOnce(&Session) -> CryptoResult<T>,
{
    let info_bytes = Zeroizing::new(asymmetric::open(recipient, wrapped.as_bytes())?);
    let info = DecryptionInfo::from_bytes(&info_bytes)?;
    let session = Session::start_from_info(info);
    consumer(&*session)
}

/// Encrypts one payload for `recipient`. `None` yields `None` and nothing is wrapped.
pub fn disclose(
    recipient: &RecipientPublicKey,
    payload: Option<&[u8]>,
) -> CryptoResult<Option<Disclosure>> {
    let Some(payload) = payload else {
        return Ok(None);
    };
    let (ciphertext, wrapped_info) = wrap_for_recipient(recipient, |s| s.encrypt(payload))?;
    Ok(Some(Disclosure {
        ciphertext,
        wrapped_info,
    }))
}

/// Decrypts a [`Disclosure`] addressed to `recipient`.
pub fn reveal(
    recipient: &RecipientPrivateKey,
    disclosure: Option<&Disclosure>,
) -> CryptoResult<Option<Vec<u8>>> {
    let Some(disclosure) = disclosure else {
        return Ok(None);
    };
    unwrap_and_run(recipient, &disclosure.wrapped_info, |s| {
        s.decrypt(&disclosure.ciphertext)
    })
    .map(Some)
}
