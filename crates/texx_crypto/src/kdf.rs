//! Key derivation functions
//!
//! `Passphrase::from_pin` — HMAC-SHA256 of the PIN keyed with itself, hex
//!   rendered and base64-encoded. Kept byte-compatible with existing
//!   accounts; it is NOT a brute-force resistant KDF on its own.
//!
//! `vault_key` — Argon2id over the passphrase, derives the 32-byte key that
//!   encrypts the identity private key at rest. Costs travel with the vault.
//!
//! `hkdf_expand` — HKDF-SHA256, used for per-message key material.

use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

// ── Passphrase (KeyedHash) ────────────────────────────────────────────────────

/// Session-only secret derived from a PIN. Never persisted.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    /// `base64(hex(HMAC-SHA256(key = pin, msg = pin)))`
    pub fn from_pin(pin: &str) -> Result<Self, CryptoError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(pin.as_bytes())
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        mac.update(pin.as_bytes());
        let digest_hex = Zeroizing::new(hex::encode(mac.finalize().into_bytes()));
        Ok(Self(Zeroizing::new(STANDARD.encode(digest_hex.as_bytes()))))
    }

    /// Wrap an already-derived passphrase.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(..)")
    }
}

// ── Vault key (Argon2id) ──────────────────────────────────────────────────────

/// 32-byte vault key derived from the passphrase. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct VaultKey(pub [u8; 32]);

pub const SALT_LEN: usize = 16;

/// Argon2id cost parameters, stored alongside the encrypted vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub lanes: u32,
}

impl Default for KdfParams {
    /// Tuned for interactive (desktop) unlock.
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            lanes: 1,
        }
    }
}

impl KdfParams {
    /// Smallest costs Argon2 accepts. Only for tests.
    pub const fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            lanes: 1,
        }
    }

    fn to_argon2(self) -> Result<Params, CryptoError> {
        Params::new(self.memory_kib, self.iterations, self.lanes, Some(32))
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
    }
}

/// Derive a vault key from the passphrase + per-vault salt.
pub fn vault_key(
    passphrase: &Passphrase,
    salt: &[u8],
    params: KdfParams,
) -> Result<VaultKey, CryptoError> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(VaultKey(output))
}

/// Fresh random salt (call once per vault; stored with it, not secret).
pub fn generate_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// ── HKDF-SHA256 ───────────────────────────────────────────────────────────────

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}
