//! texx_crypto — cryptographic building blocks for the Texx chat core
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Keys cross crate boundaries as newtypes, never as bare byte slices.
//!
//! # Module layout
//! - `identity` — long-term Ed25519 identity keypair + public key newtype
//! - `kdf`      — PIN → passphrase keyed hash, Argon2id vault key, HKDF
//! - `aead`     — XChaCha20-Poly1305 encrypt/decrypt helpers
//! - `message`  — hybrid per-message encryption between two identities
//! - `error`    — unified error type

pub mod aead;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod message;

pub use error::CryptoError;
pub use identity::{IdentityKeyPair, PublicKeyBytes};
pub use kdf::{KdfParams, Passphrase};
