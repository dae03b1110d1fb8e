//! RSA-OAEP sealing for a recipient's public key.
//!
//! A sealed blob starts with a variant byte:
//!
//! - [`SMALL_VARIANT`]: `[0x01][OAEP block]`. Used when the plaintext fits in a
//!   single OAEP block.
//! - [`LARGE_VARIANT`]: `[0x02][OAEP block of IV ‖ key][session ciphertext]`.
//!   The plaintext is encrypted under an ephemeral session and only that
//!   session's [`DecryptionInfo`] goes through RSA.
//!
//! The cut-over point is `k - 2·hLen - 2` for a `k`-byte modulus and the
//! OAEP digest length `hLen`, so it follows the key actually in use.

use crate::error::{CryptoError, CryptoResult};
use crate::key::generate_random_key;
use crate::session::{DecryptionInfo, Session};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

pub const SMALL_VARIANT: u8 = 0x01;
pub const LARGE_VARIANT: u8 = 0x02;

/// Smallest modulus accepted for generated or imported keys.
pub const MIN_KEY_BITS: usize = 1024;
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Hash used for OAEP and MGF1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OaepDigest {
    /// Reference format; kept for existing keys.
    Sha1,
    #[default]
    Sha256,
}

impl OaepDigest {
    pub fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    fn padding(self) -> Oaep {
        match self {
            Self::Sha1 => Oaep::new::<sha1::Sha1>(),
            Self::Sha256 => Oaep::new::<sha2::Sha256>(),
        }
    }
}

/// A recipient's public key together with the OAEP digest it is used with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecipientPublicKey {
    key: RsaPublicKey,
    digest: OaepDigest,
}

impl RecipientPublicKey {
    pub fn digest(&self) -> OaepDigest {
        self.digest
    }

    /// Modulus length in bytes.
    pub fn size(&self) -> usize {
        self.key.size()
    }

    /// Largest plaintext sealed with [`SMALL_VARIANT`].
    pub fn small_plaintext_limit(&self) -> usize {
        self.key
            .size()
            .saturating_sub(2 * self.digest.output_len() + 2)
    }

    /// SubjectPublicKeyInfo DER.
    pub fn to_der(&self) -> CryptoResult<Vec<u8>> {
        self.key
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::OperationFailed(format!("public key encoding failed: {e}")))
    }

    pub fn from_der(der: &[u8], digest: OaepDigest) -> CryptoResult<Self> {
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| CryptoError::OperationFailed(format!("public key decoding failed: {e}")))?;
        check_key_bits(key.size(), "public")?;
        Ok(Self { key, digest })
    }
}

/// A recipient's private key.
#[derive(Clone)]
pub struct RecipientPrivateKey {
    key: RsaPrivateKey,
    digest: OaepDigest,
}

impl RecipientPrivateKey {
    pub fn digest(&self) -> OaepDigest {
        self.digest
    }

    pub fn size(&self) -> usize {
        self.key.size()
    }

    pub fn public_key(&self) -> RecipientPublicKey {
        RecipientPublicKey {
            key: RsaPublicKey::from(&self.key),
            digest: self.digest,
        }
    }

    /// PKCS#8 DER of the private key.
    pub fn to_pkcs8_der(&self) -> CryptoResult<Zeroizing<Vec<u8>>> {
        self.key
            .to_pkcs8_der()
            .map(|doc| Zeroizing::new(doc.as_bytes().to_vec()))
            .map_err(|e| CryptoError::OperationFailed(format!("private key encoding failed: {e}")))
    }

    pub fn from_pkcs8_der(der: &[u8], digest: OaepDigest) -> CryptoResult<Self> {
        let key = RsaPrivateKey::from_pkcs8_der(der).map_err(|e| {
            CryptoError::OperationFailed(format!("private key decoding failed: {e}"))
        })?;
        check_key_bits(key.size(), "private")?;
        Ok(Self { key, digest })
    }
}

impl fmt::Debug for RecipientPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipientPrivateKey")
            .field("bits", &(self.key.size() * 8))
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

/// RSA keypair used to receive disclosures.
#[derive(Clone, Debug)]
pub struct RecipientKeyPair {
    pub public: RecipientPublicKey,
    pub private: RecipientPrivateKey,
}

impl RecipientKeyPair {
    /// Generates a fresh keypair. Slow for large `bits`.
    pub fn generate(bits: usize, digest: OaepDigest) -> CryptoResult<Self> {
        if bits < MIN_KEY_BITS {
            return Err(CryptoError::KeyGenerationFailure(format!(
                "{bits}-bit keys are below the {MIN_KEY_BITS}-bit minimum"
            )));
        }
        let key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGenerationFailure(e.to_string()))?;
        let private = RecipientPrivateKey { key, digest };
        Ok(Self {
            public: private.public_key(),
            private,
        })
    }
}

/// Seals `plaintext` so only the holder of the matching private key can open it.
pub fn seal(recipient: &RecipientPublicKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let limit = recipient.small_plaintext_limit();

    if plaintext.len() <= limit {
        debug!(len = plaintext.len(), limit, "sealing with small-plaintext variant");
        let block = rsa_encrypt(recipient, plaintext)?;
        let mut out = Vec::with_capacity(1 + block.len());
        out.push(SMALL_VARIANT);
        out.extend_from_slice(&block);
        return Ok(out);
    }

    debug!(len = plaintext.len(), limit, "sealing with large-plaintext variant");
    let session = Session::start_with_key(generate_random_key());
    let body = session.encrypt(plaintext)?;
    let block = rsa_encrypt(recipient, &session.decryption_info().to_bytes())?;
    session.close();

    let mut out = Vec::with_capacity(1 + block.len() + body.len());
    out.push(LARGE_VARIANT);
    out.extend_from_slice(&block);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Opens a blob produced by [`seal`].
pub fn open(recipient: &RecipientPrivateKey, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    let (&variant, rest) = sealed.split_first().ok_or(CryptoError::DecryptionFailed)?;
    match variant {
        SMALL_VARIANT => rsa_decrypt(recipient, rest).map(|p| p.to_vec()),
        LARGE_VARIANT => {
            let k = recipient.size();
            if rest.len() < k {
                return Err(CryptoError::DecryptionFailed);
            }
            let (block, body) = rest.split_at(k);
            let info = DecryptionInfo::from_bytes(&rsa_decrypt(recipient, block)?)?;
            let session = Session::start_from_info(info);
            session.decrypt(body)
        }
        other => Err(CryptoError::UnsupportedVariant(other)),
    }
}

/// Rejects imported keys whose modulus is below [`MIN_KEY_BITS`].
fn check_key_bits(modulus_len: usize, which: &str) -> CryptoResult<()> {
    let bits = modulus_len * 8;
    if bits < MIN_KEY_BITS {
        return Err(CryptoError::OperationFailed(format!(
            "{which} key is {bits} bits, minimum is {MIN_KEY_BITS}"
        )));
    }
    Ok(())
}

fn rsa_encrypt(recipient: &RecipientPublicKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    recipient
        .key
        .encrypt(&mut OsRng, recipient.digest.padding(), plaintext)
        .map_err(|e| CryptoError::OperationFailed(format!("RSA-OAEP encryption failed: {e}")))
}

fn rsa_decrypt(recipient: &RecipientPrivateKey, block: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
    recipient
        .key
        .decrypt(recipient.digest.padding(), block)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptionFailed)
}
