//! Shared helpers for crypto integration tests.
#![allow(dead_code)]

use std::sync::{LazyLock, Once};
use tandem_crypto::{DEFAULT_SALT, KdfParams, OaepDigest, RecipientKeyPair};
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber once per binary; honours `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Low iteration count so property tests stay quick.
pub fn fast_params() -> KdfParams {
    KdfParams::new(1_000, DEFAULT_SALT.to_vec())
}

/// 1024-bit / OAEP-SHA-1, the reference key shape.
pub static REFERENCE_PAIR: LazyLock<RecipientKeyPair> =
    LazyLock::new(|| RecipientKeyPair::generate(1024, OaepDigest::Sha1).expect("keygen"));

/// A second, unrelated keypair of the same shape.
pub static OTHER_PAIR: LazyLock<RecipientKeyPair> =
    LazyLock::new(|| RecipientKeyPair::generate(1024, OaepDigest::Sha1).expect("keygen"));

/// The default shape for new keys.
pub static MODERN_PAIR: LazyLock<RecipientKeyPair> =
    LazyLock::new(|| RecipientKeyPair::generate(2048, OaepDigest::Sha256).expect("keygen"));
