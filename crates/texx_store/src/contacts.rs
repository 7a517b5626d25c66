//! ContactKeyStore: remote peers' identity public keys by peer id.
//!
//! Keys are accepted on first contact (trust-on-first-use). A re-sent key
//! replaces the stored one; last write wins.

use chrono::Utc;
use sqlx::SqlitePool;
use texx_crypto::PublicKeyBytes;
use texx_proto::PeerId;
use tracing::{info, warn};

use crate::{error::StoreError, models::ContactRow};

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyChange {
    New,
    Unchanged,
    Replaced,
}

#[derive(Clone)]
pub struct ContactKeyStore {
    pool: SqlitePool,
}

impl ContactKeyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn put(&self, peer: &PeerId, key: &PublicKeyBytes) -> Result<KeyChange, StoreError> {
        let previous = self.get(peer).await?;
        let change = match previous {
            None => KeyChange::New,
            Some(ref old) if old == key => KeyChange::Unchanged,
            Some(_) => KeyChange::Replaced,
        };

        sqlx::query(
            "INSERT INTO contacts (peer_id, public_key, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(peer_id) DO UPDATE SET public_key = excluded.public_key, updated_at = excluded.updated_at",
        )
        .bind(peer.as_str())
        .bind(key.to_b64())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        match change {
            KeyChange::New => info!(peer = %peer, fingerprint = %key.fingerprint(), "stored key for new contact"),
            KeyChange::Replaced => warn!(peer = %peer, fingerprint = %key.fingerprint(), "contact key replaced"),
            KeyChange::Unchanged => {}
        }
        Ok(change)
    }

    /// `None` when no key-transfer from this peer has been seen yet.
    pub async fn get(&self, peer: &PeerId) -> Result<Option<PublicKeyBytes>, StoreError> {
        let key: Option<String> = sqlx::query_scalar("SELECT public_key FROM contacts WHERE peer_id = ?")
            .bind(peer.as_str())
            .fetch_optional(&self.pool)
            .await?;
        key.map(|b64| PublicKeyBytes::from_b64(&b64).map_err(StoreError::from))
            .transpose()
    }

    pub async fn list(&self) -> Result<Vec<ContactRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, ContactRow>("SELECT peer_id, public_key, updated_at FROM contacts ORDER BY peer_id")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}
