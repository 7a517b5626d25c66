//! Database row models — these map to/from SQL rows.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContactRow {
    pub peer_id: String,
    /// Base64url Ed25519 identity public key
    pub public_key: String,
    /// Unix milliseconds of the last key-transfer
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub seq: i64,
    pub peer_id: String,
    /// Output of `texx_crypto::message::encrypt`, never plaintext
    pub ciphertext: Vec<u8>,
    /// Unix milliseconds, strictly increasing per log
    pub timestamp: i64,
    /// "sent" | "received"
    pub direction: String,
}
