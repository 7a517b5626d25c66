//! Hybrid per-message encryption between two identities.
//!
//! Key agreement is static-static X25519 between the local identity and the
//! peer's identity, so a ciphertext can only be opened by the two endpoints
//! and is bound to both of them. Every call draws a fresh HKDF salt and a
//! fresh AEAD nonce; equal plaintexts never produce equal ciphertexts.
//!
//!   K  = HKDF-SHA256(salt = random16, ikm = X25519(local, peer), info = "texx-msg-v1")
//!   AD = version || min(pub_a, pub_b) || max(pub_a, pub_b)
//!
//! The associated data is order-independent, which lets either endpoint
//! re-open records of both directions from its own key material.
//!
//! Wire format:
//!   [ version (1) | salt (16) | nonce (24) | ciphertext + tag ]

use rand::RngCore;
use zeroize::Zeroizing;

use crate::{
    aead,
    error::CryptoError,
    identity::{IdentityKeyPair, PublicKeyBytes},
    kdf,
};

pub const VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const HEADER_LEN: usize = 1 + SALT_LEN;
const INFO: &[u8] = b"texx-msg-v1";

fn associated_data(a: &PublicKeyBytes, b: &PublicKeyBytes) -> Vec<u8> {
    let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
    let mut ad = Vec::with_capacity(1 + lo.0.len() + hi.0.len());
    ad.push(VERSION);
    ad.extend_from_slice(&lo.0);
    ad.extend_from_slice(&hi.0);
    ad
}

fn message_key(
    local: &IdentityKeyPair,
    peer: &PublicKeyBytes,
    salt: &[u8],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let shared = local.x25519_secret().diffie_hellman(&peer.to_x25519()?);
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey("peer key is a low-order point".into()));
    }
    let mut key = Zeroizing::new([0u8; 32]);
    kdf::hkdf_expand(shared.as_bytes(), Some(salt), INFO, &mut key[..])?;
    Ok(key)
}

/// Encrypt `plaintext` for `recipient`, bound to the local identity.
pub fn encrypt(
    plaintext: &[u8],
    recipient: &PublicKeyBytes,
    local: &IdentityKeyPair,
) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let key = message_key(local, recipient, &salt)?;
    let sealed = aead::encrypt(&key, plaintext, &associated_data(&local.public, recipient))?;

    let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
    out.push(VERSION);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Inverse of [`encrypt`]. `peer` is the other endpoint's public key.
///
/// Fails with `AeadDecrypt` on any key mismatch or corruption.
pub fn decrypt(
    ciphertext: &[u8],
    peer: &PublicKeyBytes,
    local: &IdentityKeyPair,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if ciphertext.len() < HEADER_LEN + aead::NONCE_LEN + aead::TAG_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    if ciphertext[0] != VERSION {
        return Err(CryptoError::UnsupportedVersion(ciphertext[0]));
    }
    let (salt, sealed) = ciphertext[1..].split_at(SALT_LEN);
    let key = message_key(local, peer, salt)?;
    aead::decrypt(&key, sealed, &associated_data(&local.public, peer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_across_endpoints() {
        let alice = IdentityKeyPair::generate().unwrap();
        let bob = IdentityKeyPair::generate().unwrap();

        let ct = encrypt(b"hi bob", &bob.public, &alice).unwrap();
        let pt = decrypt(&ct, &alice.public, &bob).unwrap();
        assert_eq!(pt.as_slice(), b"hi bob");
    }

    #[test]
    fn sender_can_reopen_own_message() {
        let alice = IdentityKeyPair::generate().unwrap();
        let bob = IdentityKeyPair::generate().unwrap();

        let ct = encrypt(b"note to self", &bob.public, &alice).unwrap();
        let pt = decrypt(&ct, &bob.public, &alice).unwrap();
        assert_eq!(pt.as_slice(), b"note to self");
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let alice = IdentityKeyPair::generate().unwrap();
        let bob = IdentityKeyPair::generate().unwrap();
        let a = encrypt(b"same", &bob.public, &alice).unwrap();
        let b = encrypt(b"same", &bob.public, &alice).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn third_party_cannot_decrypt() {
        let alice = IdentityKeyPair::generate().unwrap();
        let bob = IdentityKeyPair::generate().unwrap();
        let eve = IdentityKeyPair::generate().unwrap();

        let ct = encrypt(b"secret", &bob.public, &alice).unwrap();
        assert!(matches!(
            decrypt(&ct, &alice.public, &eve),
            Err(CryptoError::AeadDecrypt)
        ));
        // Right recipient, wrong claimed sender
        assert!(matches!(
            decrypt(&ct, &eve.public, &bob),
            Err(CryptoError::AeadDecrypt)
        ));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let alice = IdentityKeyPair::generate().unwrap();
        let bob = IdentityKeyPair::generate().unwrap();
        let mut ct = encrypt(b"payload", &bob.public, &alice).unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(decrypt(&ct, &alice.public, &bob).is_err());
    }

    #[test]
    fn unknown_version_is_reported() {
        let alice = IdentityKeyPair::generate().unwrap();
        let bob = IdentityKeyPair::generate().unwrap();
        let mut ct = encrypt(b"payload", &bob.public, &alice).unwrap();
        ct[0] = 9;
        assert!(matches!(
            decrypt(&ct, &alice.public, &bob),
            Err(CryptoError::UnsupportedVersion(9))
        ));
    }
}
