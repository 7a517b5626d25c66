//! Identity key management
//!
//! Each account has exactly one long-term `IdentityKeyPair` (Ed25519).
//! The public half is what a peer receives in a key-transfer; the secret
//! half only ever leaves memory encrypted under the vault key.
//!
//! Key agreement for message encryption maps both halves onto Curve25519
//! (X25519), so a single keypair serves as the whole identity.
//!
//! Trust model: a peer's key is accepted on first contact. The fingerprint
//! exists for optional out-of-band comparison; nothing enforces it.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

// ── Public key ────────────────────────────────────────────────────────────────

/// 32-byte Ed25519 public key, base64url-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyBytes(pub Vec<u8>);

impl PublicKeyBytes {
    /// Accepts only 32 bytes that decode to a valid Ed25519 point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Public key must be 32 bytes, got {}", bytes.len()))
        })?;
        VerifyingKey::from_bytes(&arr).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self(arr.to_vec()))
    }

    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Human-readable fingerprint: BLAKE3 of the public key, truncated to
    /// 20 bytes, hex-encoded in groups of 4.
    ///
    /// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789 0abc def0"
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// X25519 form of this key, used for Diffie-Hellman.
    pub fn to_x25519(&self) -> Result<X25519Public, CryptoError> {
        let ed_pub: [u8; 32] = self
            .0
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("public key not 32 bytes".into()))?;
        ed25519_pub_to_x25519(&ed_pub)
    }
}

// ── Identity keypair ──────────────────────────────────────────────────────────

/// Long-term identity key.  Drop clears memory via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    pub public: PublicKeyBytes,
    secret_bytes: [u8; 32],
}

impl IdentityKeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = PublicKeyBytes(signing_key.verifying_key().to_bytes().to_vec());
        Ok(Self {
            public,
            secret_bytes: signing_key.to_bytes(),
        })
    }

    /// Rebuild from the 32-byte secret seed; the public half is re-derived.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "Identity key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        let signing_key = SigningKey::from_bytes(&arr);
        let public = PublicKeyBytes(signing_key.verifying_key().to_bytes().to_vec());
        Ok(Self {
            public,
            secret_bytes: arr,
        })
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    pub fn public_b64(&self) -> String {
        self.public.to_b64()
    }

    pub(crate) fn x25519_secret(&self) -> StaticSecret {
        ed25519_secret_to_x25519(&self.secret_bytes)
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public.to_b64())
            .finish_non_exhaustive()
    }
}

// ── Curve conversion ──────────────────────────────────────────────────────────

/// Convert an Ed25519 secret seed to an X25519 static secret using the
/// clamped SHA-512 expansion ed25519-dalek applies internally.
pub fn ed25519_secret_to_x25519(ed_secret: &[u8; 32]) -> StaticSecret {
    use sha2::{Digest, Sha512};
    let mut h = Sha512::digest(ed_secret);
    h[0] &= 248;
    h[31] &= 127;
    h[31] |= 64;
    let mut key = [0u8; 32];
    key.copy_from_slice(&h[..32]);
    h.as_mut_slice().zeroize();
    StaticSecret::from(key)
}

/// Convert an Ed25519 public key to X25519 via the Edwards → Montgomery map.
pub fn ed25519_pub_to_x25519(ed_pub: &[u8; 32]) -> Result<X25519Public, CryptoError> {
    use curve25519_dalek::edwards::CompressedEdwardsY;
    let compressed = CompressedEdwardsY::from_slice(ed_pub)
        .map_err(|_| CryptoError::InvalidKey("invalid Ed25519 public key".into()))?;
    let point = compressed
        .decompress()
        .ok_or_else(|| CryptoError::InvalidKey("Ed25519 public key decompression failed".into()))?;
    Ok(X25519Public::from(point.to_montgomery().to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_roundtrip_rederives_public() {
        let id = IdentityKeyPair::generate().unwrap();
        let again = IdentityKeyPair::from_bytes(id.secret_bytes()).unwrap();
        assert_eq!(id.public, again.public);
    }

    #[test]
    fn converted_keys_agree() {
        let a = IdentityKeyPair::generate().unwrap();
        let b = IdentityKeyPair::generate().unwrap();
        let ab = a.x25519_secret().diffie_hellman(&b.public.to_x25519().unwrap());
        let ba = b.x25519_secret().diffie_hellman(&a.public.to_x25519().unwrap());
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn public_key_b64_roundtrip_and_validation() {
        let id = IdentityKeyPair::generate().unwrap();
        let parsed = PublicKeyBytes::from_b64(&id.public_b64()).unwrap();
        assert_eq!(parsed, id.public);
        assert!(PublicKeyBytes::from_bytes(&[0u8; 31]).is_err());
    }

    #[test]
    fn fingerprint_has_ten_groups() {
        let id = IdentityKeyPair::generate().unwrap();
        let fp = id.public.fingerprint();
        assert_eq!(fp.split(' ').count(), 10);
        assert!(fp.split(' ').all(|g| g.len() == 4));
    }
}
