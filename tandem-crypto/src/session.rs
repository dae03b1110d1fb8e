//! Thread-confined encryption sessions.
//!
//! A session holds the symmetric key for one logical operation. Starting a
//! session pushes it onto the calling thread's stack and returns a
//! [`SessionGuard`]; dropping the guard pops it again, so sessions nest and
//! are always released, including on early returns and panics.
//!
//! Sessions are `!Send`. Work handed to another thread does not inherit the
//! current session: capture the key with [`Session::export_key`] and call
//! [`Session::start_with_key`] on the other side.

use crate::cipher::{self, IV_SIZE, Iv};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{KEY_SIZE, KdfParams, SymmetricKey, derive_key};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Leading byte of every session ciphertext: AES-128-CBC/PKCS#7 with the IV inline.
pub const SESSION_VARIANT: u8 = 0x01;

thread_local! {
    static SESSIONS: RefCell<Vec<Rc<Session>>> = const { RefCell::new(Vec::new()) };
}

/// The active key for one logical operation on one thread.
pub struct Session {
    key: SymmetricKey,
    /// Generated on first encryption, then reused by every later encryption.
    iv: OnceCell<Iv>,
    /// Set by the hybrid path; takes precedence over the IV embedded in ciphertext.
    decrypt_iv: Cell<Option<Iv>>,
}

impl Session {
    fn new(key: SymmetricKey) -> Self {
        Self {
            key,
            iv: OnceCell::new(),
            decrypt_iv: Cell::new(None),
        }
    }

    /// Derives a key from `password` with the default KDF parameters and
    /// makes it the current session.
    pub fn start(password: &[u8]) -> CryptoResult<SessionGuard> {
        Self::start_with_params(password, &KdfParams::default())
    }

    /// Like [`Session::start`], then runs `check` against the new session.
    /// If it returns `false` the session is closed and
    /// [`CryptoError::CredentialRejected`] is returned.
    pub fn start_verified<F>(password: &[u8], check: F) -> CryptoResult<SessionGuard>
    where
        F: FnOnce(&Session) -> bool,
    {
        Self::start_verified_with_params(password, &KdfParams::default(), check)
    }

    pub fn start_with_params(password: &[u8], params: &KdfParams) -> CryptoResult<SessionGuard> {
        Self::start_verified_with_params(password, params, |_| true)
    }

    pub fn start_verified_with_params<F>(
        password: &[u8],
        params: &KdfParams,
        check: F,
    ) -> CryptoResult<SessionGuard>
    where
        F: FnOnce(&Session) -> bool,
    {
        let key = derive_key(password, params)?;
        let guard = Self::start_with_key(key);
        if !check(&*guard) {
            debug!("integrity check rejected derived key");
            guard.close();
            return Err(CryptoError::CredentialRejected);
        }
        Ok(guard)
    }

    /// Makes an already obtained key the current session, skipping derivation.
    pub fn start_with_key(key: SymmetricKey) -> SessionGuard {
        let session = Rc::new(Self::new(key));
        let depth = SESSIONS.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(Rc::clone(&session));
            stack.len()
        });
        debug!(depth, "session started");
        SessionGuard { session }
    }

    /// Starts a session from unwrapped [`DecryptionInfo`], with its IV set
    /// explicitly for decryption.
    pub fn start_from_info(info: DecryptionInfo) -> SessionGuard {
        let guard = Self::start_with_key(info.key.clone());
        guard.set_initialization_vector(info.iv);
        guard
    }

    /// Returns the topmost session of the calling thread.
    pub fn current() -> CryptoResult<Rc<Session>> {
        SESSIONS
            .try_with(|stack| stack.borrow().last().cloned())
            .ok()
            .flatten()
            .ok_or(CryptoError::NoActiveSession)
    }

    /// Number of sessions active on the calling thread.
    pub fn depth() -> usize {
        SESSIONS.try_with(|stack| stack.borrow().len()).unwrap_or(0)
    }

    /// Encrypts to `[variant][IV][AES-CBC ciphertext]`.
    ///
    /// Every encryption in a session uses the same IV, so equal plaintexts
    /// under one session produce equal ciphertexts.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let iv = self.initialization_vector();
        let body = cipher::encrypt_cbc(&self.key, &iv, plaintext)?;

        let mut out = Vec::with_capacity(1 + IV_SIZE + body.len());
        out.push(SESSION_VARIANT);
        out.extend_from_slice(iv.as_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decrypts a blob produced by [`Session::encrypt`].
    ///
    /// Any failure other than an unknown variant is reported as
    /// [`CryptoError::DecryptionFailed`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let (&variant, rest) = ciphertext
            .split_first()
            .ok_or(CryptoError::DecryptionFailed)?;
        if variant != SESSION_VARIANT {
            return Err(CryptoError::UnsupportedVariant(variant));
        }
        if rest.len() < IV_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let (embedded_iv, body) = rest.split_at(IV_SIZE);
        let iv = match self.decrypt_iv.get() {
            Some(iv) => iv,
            None => Iv::from_slice(embedded_iv)?,
        };
        cipher::decrypt_cbc(&self.key, &iv, body)
    }

    /// `None` in, `None` out; used for absent fields.
    pub fn encrypt_field(&self, plaintext: Option<&[u8]>) -> CryptoResult<Option<Vec<u8>>> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    pub fn decrypt_field(&self, ciphertext: Option<&[u8]>) -> CryptoResult<Option<Vec<u8>>> {
        ciphertext.map(|c| self.decrypt(c)).transpose()
    }

    /// Encrypts a string into base64 text suitable for a text column.
    pub fn encrypt_string(&self, plaintext: &str) -> CryptoResult<String> {
        Ok(STANDARD.encode(self.encrypt(plaintext.as_bytes())?))
    }

    pub fn decrypt_string(&self, encoded: &str) -> CryptoResult<String> {
        let ciphertext = STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let plaintext = self.decrypt(&ciphertext)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Returns this session's encryption IV, generating it if no encryption
    /// has happened yet.
    pub fn initialization_vector(&self) -> Iv {
        *self.iv.get_or_init(Iv::random)
    }

    pub fn set_initialization_vector(&self, iv: Iv) {
        self.decrypt_iv.set(Some(iv));
    }

    /// Copies the key out so another thread can start its own session with it.
    pub fn export_key(&self) -> SymmetricKey {
        self.key.clone()
    }

    /// The IV and key needed to decrypt what this session has encrypted.
    pub fn decryption_info(&self) -> DecryptionInfo {
        DecryptionInfo {
            iv: self.initialization_vector(),
            key: self.key.clone(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("iv_materialized", &self.iv.get().is_some())
            .field("decrypt_iv_set", &self.decrypt_iv.get().is_some())
            .finish_non_exhaustive()
    }
}

/// Keeps a session current until dropped or closed.
#[must_use = "the session closes as soon as the guard is dropped"]
pub struct SessionGuard {
    session: Rc<Session>,
}

impl SessionGuard {
    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    /// Pops the session. Equivalent to dropping the guard.
    pub fn close(self) {}
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // TLS may already be gone during thread teardown
        let _ = SESSIONS.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|s| Rc::ptr_eq(s, &self.session)) {
                stack.remove(pos);
            }
            debug!(depth = stack.len(), "session closed");
        });
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionGuard").field(&self.session).finish()
    }
}

/// `IV ‖ key`, created only to be wrapped for a recipient.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DecryptionInfo {
    iv: Iv,
    key: SymmetricKey,
}

impl DecryptionInfo {
    /// Length of the serialized form.
    pub const LEN: usize = IV_SIZE + KEY_SIZE;

    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(Self::LEN));
        out.extend_from_slice(self.iv.as_bytes());
        out.extend_from_slice(self.key.as_bytes());
        out
    }

    /// Parses unwrapped bytes. Anything but the exact length is a decryption failure.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != Self::LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let (iv, key) = bytes.split_at(IV_SIZE);
        Ok(Self {
            iv: Iv::from_slice(iv)?,
            key: SymmetricKey::from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?,
        })
    }

    pub fn iv(&self) -> Iv {
        self.iv
    }
}

impl fmt::Debug for DecryptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionInfo(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::generate_random_key;
    use std::panic::{self, AssertUnwindSafe};

    fn fast() -> KdfParams {
        KdfParams::new(1_000, crate::key::DEFAULT_SALT.to_vec())
    }

    #[test]
    fn no_session_by_default() {
        assert_eq!(Session::current().unwrap_err(), CryptoError::NoActiveSession);
        assert_eq!(Session::depth(), 0);
    }

    #[test]
    fn sessions_nest_and_pop() {
        let outer = Session::start_with_key(generate_random_key());
        let outer_ct = outer.encrypt(b"outer").unwrap();
        {
            let inner = Session::start_with_key(generate_random_key());
            assert_eq!(Session::depth(), 2);
            assert!(Rc::ptr_eq(&Session::current().unwrap(), inner.session()));
            // the inner key cannot read the outer data
            assert_ne!(
                Session::current().unwrap().decrypt(&outer_ct).ok(),
                Some(b"outer".to_vec())
            );
        }
        assert_eq!(Session::depth(), 1);
        assert_eq!(Session::current().unwrap().decrypt(&outer_ct).unwrap(), b"outer");
        outer.close();
        assert_eq!(Session::depth(), 0);
    }

    #[test]
    fn out_of_order_close_removes_the_right_session() {
        let a = Session::start_with_key(generate_random_key());
        let b = Session::start_with_key(generate_random_key());
        let b_session = Rc::clone(b.session());
        drop(a);
        assert_eq!(Session::depth(), 1);
        assert!(Rc::ptr_eq(&Session::current().unwrap(), &b_session));
        drop(b);
        assert_eq!(Session::depth(), 0);
    }

    #[test]
    fn panic_inside_session_still_pops() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = Session::start_with_key(generate_random_key());
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(Session::depth(), 0);
    }

    #[test]
    fn rejected_check_closes_session() {
        let err = Session::start_verified_with_params(b"secret", &fast(), |_| false).unwrap_err();
        assert_eq!(err, CryptoError::CredentialRejected);
        assert_eq!(Session::depth(), 0);
    }

    #[test]
    fn check_sees_the_new_session_as_current() {
        let guard = Session::start_verified_with_params(b"secret", &fast(), |s| {
            Session::current().is_ok_and(|c| std::ptr::eq(c.as_ref(), s))
        })
        .unwrap();
        assert_eq!(Session::depth(), 1);
        drop(guard);
    }

    #[test]
    fn missing_password_fails_before_push() {
        let err = Session::start_with_params(b"", &fast()).unwrap_err();
        assert_eq!(err, CryptoError::MissingCredential);
        assert_eq!(Session::depth(), 0);
    }

    #[test]
    fn iv_is_reused_within_a_session() {
        let guard = Session::start_with_key(generate_random_key());
        let a = guard.encrypt(b"one").unwrap();
        let b = guard.encrypt(b"two").unwrap();
        assert_eq!(a[1..=IV_SIZE], b[1..=IV_SIZE]);
        assert_eq!(&a[1..=IV_SIZE], guard.initialization_vector().as_bytes());
    }

    #[test]
    fn ciphertext_layout() {
        let guard = Session::start_with_key(generate_random_key());
        let ct = guard.encrypt(b"sixteen byte msg").unwrap();
        assert_eq!(ct[0], SESSION_VARIANT);
        // 16 plaintext bytes pad to two blocks
        assert_eq!(ct.len(), 1 + IV_SIZE + 32);
    }

    #[test]
    fn unknown_variant_rejected() {
        let guard = Session::start_with_key(generate_random_key());
        let mut ct = guard.encrypt(b"data").unwrap();
        ct[0] = 0x7F;
        assert_eq!(guard.decrypt(&ct).unwrap_err(), CryptoError::UnsupportedVariant(0x7F));
    }

    #[test]
    fn truncated_input_is_decryption_failure() {
        let guard = Session::start_with_key(generate_random_key());
        assert_eq!(guard.decrypt(&[]).unwrap_err(), CryptoError::DecryptionFailed);
        assert_eq!(
            guard.decrypt(&[SESSION_VARIANT, 1, 2, 3]).unwrap_err(),
            CryptoError::DecryptionFailed
        );
    }

    #[test]
    fn explicit_iv_overrides_embedded() {
        let key = generate_random_key();
        let writer = Session::start_with_key(key.clone());
        let mut ct = writer.encrypt(b"checked in today").unwrap();
        let iv = writer.initialization_vector();
        drop(writer);

        // scrub the embedded IV; only the explicit one can decrypt now
        for b in &mut ct[1..=IV_SIZE] {
            *b = 0;
        }
        let reader = Session::start_with_key(key);
        reader.set_initialization_vector(iv);
        assert_eq!(reader.decrypt(&ct).unwrap(), b"checked in today");
    }

    #[test]
    fn absent_fields_pass_through() {
        let guard = Session::start_with_key(generate_random_key());
        assert_eq!(guard.encrypt_field(None).unwrap(), None);
        assert_eq!(guard.decrypt_field(None).unwrap(), None);

        let ct = guard.encrypt_field(Some(b"note")).unwrap();
        assert_eq!(
            guard.decrypt_field(ct.as_deref()).unwrap().as_deref(),
            Some(&b"note"[..])
        );
    }

    #[test]
    fn string_round_trip() {
        let guard = Session::start_with_key(generate_random_key());
        let encoded = guard.encrypt_string("slept 7h").unwrap();
        assert_eq!(guard.decrypt_string(&encoded).unwrap(), "slept 7h");
        assert_eq!(
            guard.decrypt_string("not base64!").unwrap_err(),
            CryptoError::DecryptionFailed
        );
    }

    #[test]
    fn session_does_not_cross_threads() {
        let guard = Session::start_with_key(generate_random_key());
        let key = guard.export_key();
        let ct = guard.encrypt(b"handoff").unwrap();

        let plaintext = std::thread::spawn(move || {
            assert_eq!(Session::current().unwrap_err(), CryptoError::NoActiveSession);
            let resumed = Session::start_with_key(key);
            resumed.decrypt(&ct)
        })
        .join()
        .unwrap()
        .unwrap();

        assert_eq!(plaintext, b"handoff");
        assert_eq!(Session::depth(), 1);
    }

    #[test]
    fn decryption_info_round_trip() {
        let guard = Session::start_with_key(generate_random_key());
        let info = guard.decryption_info();
        let bytes = info.to_bytes();
        assert_eq!(bytes.len(), DecryptionInfo::LEN);
        let parsed = DecryptionInfo::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.iv(), guard.initialization_vector());
        assert!(DecryptionInfo::from_bytes(&bytes[1..]).is_err());
    }
}
