//! texx_store — local persistence for one Texx account
//!
//! # What lives where
//! - `vault.json` — the identity record. The private key is sealed with
//!   XChaCha20-Poly1305 under an Argon2id key derived from the passphrase;
//!   the public key and handle are readable without unlocking.
//! - `peer_id` — the handle remembered since first run, used to verify the
//!   identity on unlock.
//! - `attempts.json` — consecutive failed unlocks (lockout counter).
//! - `texx.db` — SQLite: contact public keys, the ciphertext message log and
//!   the dead-letter queue of received records waiting for a sender key.
//!   Message bodies are only ever stored as ciphertext produced by
//!   `texx_crypto::message`.
//!
//! # Migration
//! SQLx migrations in `migrations/` are run on every open.

pub mod attempts;
pub mod contacts;
pub mod db;
pub mod error;
pub mod message_log;
pub mod models;
pub mod pending;
pub mod vault;

pub use attempts::AttemptCounter;
pub use contacts::{ContactKeyStore, KeyChange};
pub use db::Store;
pub use error::StoreError;
pub use message_log::{Appended, Direction, History, HistoryEntry, MessageLog, MessageRecord};
pub use pending::DeadLetters;
pub use vault::{Identity, IdentityVault};
