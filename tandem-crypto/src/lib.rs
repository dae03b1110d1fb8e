//! Session-scoped field encryption for Tandem.
//!
//! Provides:
//! - PBKDF2-HMAC-SHA256 key derivation from passwords
//! - AES-128-CBC sessions with variant-tagged ciphertext
//! - RSA-OAEP sealing for recipients
//! - Deferred disclosure to principals who never saw the password
//!
//! # Architecture
//!
//! 1. **Session**: every request that reads or writes private fields runs
//!    inside a session started from the user's password. The derived key is
//!    never stored; each request derives it again.
//!
//! 2. **Disclosure**: data for a buddy or a background job is encrypted
//!    under a random ephemeral key. That key (with its IV) is sealed with the
//!    recipient's RSA public key and stored next to the ciphertext.
//!
//! 3. **Recipient keys**: each principal's private key is stored encrypted
//!    under their own password session, so opening a disclosure needs only
//!    the recipient's password.

pub mod asymmetric;
mod cipher;
mod config;
pub mod disclosure;
mod encoding;
pub mod encryptor;
mod error;
mod key;
mod protected;
mod session;

pub use asymmetric::{
    LARGE_VARIANT, OaepDigest, RecipientKeyPair, RecipientPrivateKey, RecipientPublicKey,
    SMALL_VARIANT,
};
pub use cipher::{IV_SIZE, Iv};
pub use config::CryptoConfig;
pub use disclosure::{
    Disclosure, WrappedInfo, disclose, reveal, unwrap_and_run, wrap_for_recipient,
};
pub use encryptor::{FieldEncryptor, PassthroughEncryptor, SessionEncryptor};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    DEFAULT_ITERATIONS, DEFAULT_SALT, KEY_SIZE, KdfParams, SymmetricKey, derive_key,
    generate_random_key,
};
pub use protected::ProtectedKeyPair;
pub use session::{DecryptionInfo, SESSION_VARIANT, Session, SessionGuard};
