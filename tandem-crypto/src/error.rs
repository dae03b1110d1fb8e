//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can leave the crypto layer.
///
/// Underlying cipher and RSA errors are mapped into one of these at the call
/// site; none of their detail crosses this boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("no password supplied")]
    MissingCredential,

    #[error("credential rejected")]
    CredentialRejected,

    /// Wrong key, tampered data and truncated input are deliberately not told apart.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("unsupported ciphertext variant: {0:#04x}")]
    UnsupportedVariant(u8),

    #[error("key generation failed: {0}")]
    KeyGenerationFailure(String),

    #[error("no active session on this thread")]
    NoActiveSession,

    #[error("crypto operation failed: {0}")]
    OperationFailed(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid crypto configuration: {0}")]
    Config(String),
}
