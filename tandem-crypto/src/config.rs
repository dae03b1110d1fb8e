//! Crypto configuration.

use crate::asymmetric::{DEFAULT_KEY_BITS, MIN_KEY_BITS, OaepDigest, RecipientKeyPair};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{DEFAULT_ITERATIONS, DEFAULT_SALT, KdfParams};
use serde::{Deserialize, Serialize};

/// Application-wide crypto settings. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2 iteration count.
    pub kdf_iterations: u32,

    /// Fixed KDF salt, base64 in serialized form.
    #[serde(with = "crate::encoding::base64_bytes")]
    pub kdf_salt: Vec<u8>,

    /// Modulus size for newly generated recipient keys.
    pub recipient_key_bits: usize,

    /// OAEP digest for newly generated recipient keys.
    pub oaep_digest: OaepDigest,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_ITERATIONS,
            kdf_salt: DEFAULT_SALT.to_vec(),
            recipient_key_bits: DEFAULT_KEY_BITS,
            oaep_digest: OaepDigest::Sha256,
        }
    }
}

impl CryptoConfig {
    /// Parses and validates a JSON config.
    pub fn from_json(json: &str) -> CryptoResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CryptoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CryptoResult<()> {
        if self.kdf_iterations == 0 {
            return Err(CryptoError::Config("kdf_iterations must be non-zero".into()));
        }
        if self.kdf_salt.is_empty() {
            return Err(CryptoError::Config("kdf_salt must not be empty".into()));
        }
        if self.recipient_key_bits < MIN_KEY_BITS {
            return Err(CryptoError::Config(format!(
                "recipient_key_bits must be at least {MIN_KEY_BITS}, got {}",
                self.recipient_key_bits
            )));
        }
        Ok(())
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams::new(self.kdf_iterations, self.kdf_salt.clone())
    }

    pub fn generate_keypair(&self) -> CryptoResult<RecipientKeyPair> {
        RecipientKeyPair::generate(self.recipient_key_bits, self.oaep_digest)
    }

    /// Cheap settings for unit tests.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            kdf_iterations: 1_000,
            kdf_salt: DEFAULT_SALT.to_vec(),
            recipient_key_bits: MIN_KEY_BITS,
            oaep_digest: OaepDigest::Sha1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CryptoConfig::default();
        config.validate().unwrap();
        assert_eq!(config.kdf_params(), KdfParams::default());
    }

    #[test]
    fn empty_json_gives_defaults() {
        assert_eq!(CryptoConfig::from_json("{}").unwrap(), CryptoConfig::default());
    }

    #[test]
    fn partial_json_overrides() {
        let config = CryptoConfig::from_json(
            r#"{"kdf_iterations": 5000, "kdf_salt": "c2FsdHNhbHQ=", "oaep_digest": "sha1"}"#,
        )
        .unwrap();
        assert_eq!(config.kdf_iterations, 5000);
        assert_eq!(config.kdf_salt, b"saltsalt");
        assert_eq!(config.oaep_digest, OaepDigest::Sha1);
        assert_eq!(config.recipient_key_bits, DEFAULT_KEY_BITS);
    }

    #[test]
    fn invalid_values_rejected() {
        for json in [
            r#"{"kdf_iterations": 0}"#,
            r#"{"kdf_salt": ""}"#,
            r#"{"recipient_key_bits": 512}"#,
            r#"{"kdf_salt": "***"}"#,
            r#"{"oaep_digest": "md5"}"#,
        ] {
            let err = CryptoConfig::from_json(json).unwrap_err();
            assert!(matches!(err, CryptoError::Config(_)), "{json} gave {err:?}");
        }
    }

    #[test]
    fn test_config_generates_small_keys() {
        let pair = CryptoConfig::test().generate_keypair().unwrap();
        assert_eq!(pair.public.size(), 128);
        assert_eq!(pair.public.small_plaintext_limit(), 86);
    }
}
