use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{Result, VaultError};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const WRAP_KEY_INFO: &[u8] = b"vault-wrap-key";
const PBKDF2_ROUNDS: u32 = 480_000;

/// The key derived from a password and a vault's salt. Lives only in memory
/// between `unlock` and `lock` and is wiped on drop.
#[derive(Clone)]
pub struct MasterKey(pub [u8; KEY_LEN]);

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// A per-record key, generated fresh for exactly one encryption and
/// discarded once wrapped.
#[derive(Clone)]
pub struct DataEncryptionKey(pub [u8; KEY_LEN]);

impl DataEncryptionKey {
    /// # Panics
    /// Panics if the OS RNG fails to produce randomness.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn generate() -> Self {
        let mut k = [0u8; KEY_LEN];
        getrandom::fill(&mut k).expect("failed to get random bytes");
        Self(k)
    }
}

impl Drop for DataEncryptionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Which password KDF produced a given `MasterKey`. Persisted in vault
/// metadata so re-unlocking a vault never has to guess.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KdfAlgorithm {
    Argon2id,
    Pbkdf2HmacSha256,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum KdfParams {
    Argon2id {
        salt: Vec<u8>,
        m_cost_kib: u32,
        t_cost: u32,
        p_cost: u32,
    },
    Pbkdf2HmacSha256 {
        salt: Vec<u8>,
        rounds: u32,
    },
}

impl KdfParams {
    #[must_use]
    pub fn algorithm(&self) -> KdfAlgorithm {
        match self {
            KdfParams::Argon2id { .. } => KdfAlgorithm::Argon2id,
            KdfParams::Pbkdf2HmacSha256 { .. } => KdfAlgorithm::Pbkdf2HmacSha256,
        }
    }

    #[must_use]
    pub fn salt(&self) -> &[u8] {
        match self {
            KdfParams::Argon2id { salt, .. } | KdfParams::Pbkdf2HmacSha256 { salt, .. } => salt,
        }
    }

    /// Builds the default parameter set for a freshly created vault, choosing
    /// the algorithm based on `use_argon2`.
    ///
    /// # Panics
    /// Panics if the OS RNG fails to produce randomness.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn new_default(use_argon2: bool) -> Self {
        let mut salt = vec![0u8; 16];
        getrandom::fill(&mut salt).expect("failed to get random bytes");
        if use_argon2 {
            KdfParams::Argon2id {
                salt,
                m_cost_kib: 65_536,
                t_cost: 2,
                p_cost: 1,
            }
        } else {
            KdfParams::Pbkdf2HmacSha256 {
                salt,
                rounds: PBKDF2_ROUNDS,
            }
        }
    }
}

/// Derives the master key from a password under the given KDF parameters.
///
/// # Errors
/// Returns [`VaultError::CryptoFailure`] if the underlying KDF rejects its
/// parameters or fails to complete.
pub fn derive_master_key(password: &str, params: &KdfParams) -> Result<MasterKey> {
    let mut out = [0u8; KEY_LEN];
    match params {
        KdfParams::Argon2id {
            salt,
            m_cost_kib,
            t_cost,
            p_cost,
        } => {
            let argon2 = Argon2::new(
                Algorithm::Argon2id,
                Version::V0x13,
                Params::new(*m_cost_kib, *t_cost, *p_cost, Some(KEY_LEN))
                    .map_err(|e| VaultError::CryptoFailure(e.to_string()))?,
            );
            argon2
                .hash_password_into(password.as_bytes(), salt, &mut out)
                .map_err(|e| VaultError::CryptoFailure(e.to_string()))?;
        }
        KdfParams::Pbkdf2HmacSha256 { salt, rounds } => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, *rounds, &mut out);
        }
    }
    Ok(MasterKey(out))
}

/// Derives the session wrap key from the master key via HKDF-Expand.
///
/// # Errors
/// Returns [`VaultError::CryptoFailure`] if HKDF rejects the requested
/// output length (never happens for a 32-byte key, but the underlying API
/// is fallible).
pub fn derive_wrap_key(mk: &MasterKey) -> Result<MasterKey> {
    let hk = Hkdf::<Sha256>::from_prk(&mk.0).map_err(|e| VaultError::CryptoFailure(e.to_string()))?;
    let mut out = [0u8; KEY_LEN];
    hk.expand(WRAP_KEY_INFO, &mut out)
        .map_err(|e| VaultError::CryptoFailure(e.to_string()))?;
    Ok(MasterKey(out))
}

/// Encrypts `plaintext` under `key`, binding `aad`. Returns `nonce || ciphertext_with_tag`.
///
/// # Errors
/// Returns [`VaultError::CryptoFailure`] if the AEAD encryption fails or
/// randomness cannot be drawn for the nonce.
pub fn aead_encrypt(key: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| VaultError::CryptoFailure(e.to_string()))?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    getrandom::fill(&mut nonce_bytes).map_err(|e| VaultError::CryptoFailure(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ct = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| VaultError::CryptoFailure("AEAD encrypt failed".into()))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Decrypts a `nonce || ciphertext_with_tag` blob produced by [`aead_encrypt`].
///
/// # Errors
/// Returns [`VaultError::CryptoFailure`] if the blob is too short to contain
/// a nonce, the tag fails to verify, or `aad` does not match what was used
/// at encryption time.
pub fn aead_decrypt(key: &[u8; KEY_LEN], blob: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN {
        return Err(VaultError::CryptoFailure("ciphertext too short".into()));
    }
    let (nonce_bytes, ct) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| VaultError::CryptoFailure(e.to_string()))?;
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, Payload { msg: ct, aad })
        .map_err(|_| VaultError::CryptoFailure("AEAD decrypt failed".into()))
}

/// Wraps a per-record DEK under the wrap key, binding `aad` (the record's
/// primary key, or a fixed constant for vault-level secrets like the canary).
///
/// # Errors
/// Propagates [`VaultError::CryptoFailure`] from the underlying AEAD call.
pub fn wrap_dek(wrap_key: &MasterKey, dek: &DataEncryptionKey, aad: &[u8]) -> Result<Vec<u8>> {
    aead_encrypt(&wrap_key.0, &dek.0, aad)
}

/// Unwraps a DEK previously produced by [`wrap_dek`].
///
/// # Errors
/// Returns [`VaultError::CryptoFailure`] on tag mismatch, AAD mismatch, or
/// a malformed blob.
pub fn unwrap_dek(wrap_key: &MasterKey, wrapped: &[u8], aad: &[u8]) -> Result<DataEncryptionKey> {
    let pt = aead_decrypt(&wrap_key.0, wrapped, aad)?;
    if pt.len() != KEY_LEN {
        return Err(VaultError::CryptoFailure("unwrapped key has wrong length".into()));
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&pt);
    Ok(DataEncryptionKey(key))
}
