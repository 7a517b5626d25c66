//! MessageLog: append-only ciphertext history per peer.
//!
//! Only ciphertext is written. Plaintext exists transiently while a
//! [`History`] is being iterated.
//!
//! Ordering: `seq` (autoincrement) is the durability order and the replay
//! order. Timestamps are Unix milliseconds, strictly increasing across the
//! whole log even when the wall clock stalls or steps back.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::debug;

use texx_crypto::{message, IdentityKeyPair, PublicKeyBytes};
use texx_proto::PeerId;

use crate::{contacts::ContactKeyStore, error::StoreError, models::MessageRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Received => "received",
        }
    }

    fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "sent" => Ok(Self::Sent),
            "received" => Ok(Self::Received),
            other => Err(StoreError::Corrupt(format!("unknown direction {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub seq: i64,
    pub peer_id: PeerId,
    pub ciphertext: Vec<u8>,
    pub timestamp: i64,
    pub direction: Direction,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            seq: row.seq,
            peer_id: PeerId::parse(&row.peer_id)?,
            ciphertext: row.ciphertext,
            timestamp: row.timestamp,
            direction: Direction::parse(&row.direction)?,
        })
    }
}

/// Where an append landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    pub seq: i64,
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct MessageLog {
    pool: SqlitePool,
    /// Last timestamp handed out.
    clock: Arc<Mutex<i64>>,
}

impl MessageLog {
    pub async fn load(pool: SqlitePool) -> Result<Self, StoreError> {
        let last: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(timestamp), 0) FROM messages")
            .fetch_one(&pool)
            .await?;
        Ok(Self {
            pool,
            clock: Arc::new(Mutex::new(last)),
        })
    }

    /// Persist one ciphertext record.
    pub async fn append(
        &self,
        peer: &PeerId,
        ciphertext: &[u8],
        direction: Direction,
    ) -> Result<Appended, StoreError> {
        let mut last = self.clock.lock().await;
        let timestamp = Utc::now().timestamp_millis().max(*last + 1);

        let seq = sqlx::query("INSERT INTO messages (peer_id, ciphertext, timestamp, direction) VALUES (?, ?, ?, ?)")
            .bind(peer.as_str())
            .bind(ciphertext)
            .bind(timestamp)
            .bind(direction.as_str())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        *last = timestamp;
        debug!(peer = %peer, direction = direction.as_str(), seq, timestamp, "message appended");
        Ok(Appended { seq, timestamp })
    }

    /// Snapshot of every committed record for `peer`, in append order.
    pub async fn records(&self, peer: &PeerId) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT seq, peer_id, ciphertext, timestamp, direction FROM messages WHERE peer_id = ? ORDER BY seq",
        )
        .bind(peer.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MessageRecord::try_from).collect()
    }

    pub async fn count(&self, peer: &PeerId) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE peer_id = ?")
            .bind(peer.as_str())
            .fetch_one(&self.pool)
            .await?)
    }

    /// Decrypting replay of `peer`'s history.
    ///
    /// Both directions are opened with the peer's stored key: the message
    /// key is agreed between the two identities, so the sender can re-open
    /// what it sent. Records that fail to open are skipped and counted.
    pub async fn history<'a>(
        &self,
        peer: &PeerId,
        contacts: &ContactKeyStore,
        local: &'a IdentityKeyPair,
    ) -> Result<History<'a>, StoreError> {
        let records = self.records(peer).await?;
        let peer_key = contacts.get(peer).await?;
        Ok(History::new(records, peer_key, local))
    }
}

/// One displayable history line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub plaintext: String,
    pub timestamp: i64,
    pub direction: Direction,
}

/// Lazy, finite replay over a snapshot. Calling `history` again starts over.
pub struct History<'a> {
    records: std::vec::IntoIter<MessageRecord>,
    peer_key: Option<PublicKeyBytes>,
    local: &'a IdentityKeyPair,
    failures: usize,
}

impl<'a> History<'a> {
    fn new(records: Vec<MessageRecord>, peer_key: Option<PublicKeyBytes>, local: &'a IdentityKeyPair) -> Self {
        Self {
            records: records.into_iter(),
            peer_key,
            local,
            failures: 0,
        }
    }

    /// Records skipped so far because they could not be decrypted.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Drain the replay into entries plus the failure count.
    pub fn into_report(mut self) -> (Vec<HistoryEntry>, usize) {
        let entries: Vec<HistoryEntry> = self.by_ref().collect();
        (entries, self.failures)
    }

    fn open(&self, record: &MessageRecord) -> Option<HistoryEntry> {
        let peer_key = self.peer_key.as_ref()?;
        let plaintext = message::decrypt(&record.ciphertext, peer_key, self.local).ok()?;
        let text = String::from_utf8(plaintext.to_vec()).ok()?;
        Some(HistoryEntry {
            plaintext: text,
            timestamp: record.timestamp,
            direction: record.direction,
        })
    }
}

impl Iterator for History<'_> {
    type Item = HistoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(record) = self.records.next() {
            if let Some(entry) = self.open(&record) {
                return Some(entry);
            }
            debug!(seq = record.seq, "history record could not be decrypted");
            self.failures += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use tempfile::tempdir;
    use texx_crypto::KdfParams;

    #[tokio::test]
    async fn timestamps_strictly_increase() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        let bob = PeerId::parse("bob-owl").unwrap();

        let mut prev = 0;
        for _ in 0..20 {
            let ts = store.log.append(&bob, b"ct", Direction::Sent).await.unwrap().timestamp;
            assert!(ts > prev);
            prev = ts;
        }
    }

    #[tokio::test]
    async fn clock_resumes_after_reopen() {
        let dir = tempdir().unwrap();
        let bob = PeerId::parse("bob-owl").unwrap();
        let first = {
            let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
            let first = store.log.append(&bob, b"a", Direction::Received).await.unwrap();
            store.close().await;
            first
        };
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        let second = store.log.append(&bob, b"b", Direction::Received).await.unwrap();
        assert!(second.timestamp > first.timestamp);
        assert!(second.seq > first.seq);

        let records = store.log.records(&bob).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ciphertext, b"a");
        assert_eq!(records[1].ciphertext, b"b");
    }

    #[tokio::test]
    async fn history_without_contact_key_counts_everything_as_failed() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        let me = IdentityKeyPair::generate().unwrap();
        let bob = PeerId::parse("bob-owl").unwrap();
        store.log.append(&bob, b"opaque", Direction::Received).await.unwrap();

        let history = store.log.history(&bob, &store.contacts, &me).await.unwrap();
        let (entries, failed) = history.into_report();
        assert!(entries.is_empty());
        assert_eq!(failed, 1);
    }
}
