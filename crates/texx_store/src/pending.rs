//! Dead letters: received records that could not be opened yet.
//!
//! Entries point at message log rows by `seq`, so the queue survives a
//! restart and never holds ciphertext of its own. Bounded per peer; on
//! overflow the oldest entry is dropped and counted as lost while the
//! record itself stays in the log.

use sqlx::SqlitePool;
use texx_proto::PeerId;
use tracing::{debug, warn};

use crate::{error::StoreError, message_log::MessageRecord, models::MessageRow};

#[derive(Clone)]
pub struct DeadLetters {
    pool: SqlitePool,
}

impl DeadLetters {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Queue log record `seq` for `peer`, keeping at most `limit` entries.
    /// Returns how many old entries were dropped.
    pub async fn push(&self, peer: &PeerId, seq: i64, limit: usize) -> Result<u64, StoreError> {
        let limit = i64::try_from(limit.max(1)).unwrap_or(i64::MAX);
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO pending (seq, peer_id) VALUES (?, ?)")
            .bind(seq)
            .bind(peer.as_str())
            .execute(&mut *tx)
            .await?;
        let len: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending WHERE peer_id = ?")
            .bind(peer.as_str())
            .fetch_one(&mut *tx)
            .await?;

        let excess = (len - limit).max(0);
        if excess > 0 {
            sqlx::query(
                "DELETE FROM pending WHERE seq IN
                 (SELECT seq FROM pending WHERE peer_id = ? ORDER BY seq LIMIT ?)",
            )
            .bind(peer.as_str())
            .bind(excess)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT INTO pending_lost (peer_id, lost) VALUES (?, ?)
                 ON CONFLICT(peer_id) DO UPDATE SET lost = lost + excluded.lost",
            )
            .bind(peer.as_str())
            .bind(excess)
            .execute(&mut *tx)
            .await?;
            warn!(peer = %peer, dropped = excess, "pending queue full, oldest entries dropped");
        }
        tx.commit().await?;

        debug!(peer = %peer, seq, "record queued until sender key arrives");
        Ok(excess as u64)
    }

    /// Queued records for `peer`, oldest first. They stay queued until
    /// [`release`](Self::release)d.
    pub async fn records(&self, peer: &PeerId) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT m.seq, m.peer_id, m.ciphertext, m.timestamp, m.direction
             FROM pending p JOIN messages m ON m.seq = p.seq
             WHERE p.peer_id = ? ORDER BY p.seq",
        )
        .bind(peer.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MessageRecord::try_from).collect()
    }

    /// Remove entries that have been delivered.
    pub async fn release(&self, seqs: &[i64]) -> Result<(), StoreError> {
        if seqs.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for seq in seqs {
            sqlx::query("DELETE FROM pending WHERE seq = ?")
                .bind(seq)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn len(&self, peer: &PeerId) -> Result<usize, StoreError> {
        let len: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending WHERE peer_id = ?")
            .bind(peer.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(len as usize)
    }

    /// Total dropped for `peer` since the account was created.
    pub async fn lost(&self, peer: &PeerId) -> Result<u64, StoreError> {
        let lost: Option<i64> = sqlx::query_scalar("SELECT lost FROM pending_lost WHERE peer_id = ?")
            .bind(peer.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(lost.unwrap_or(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::message_log::Direction;
    use tempfile::tempdir;
    use texx_crypto::KdfParams;

    async fn received(store: &Store, peer: &PeerId, body: &[u8]) -> i64 {
        store.log.append(peer, body, Direction::Received).await.unwrap().seq
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        let bob = PeerId::parse("bob-owl").unwrap();

        for body in [b"1", b"2", b"3"] {
            let seq = received(&store, &bob, body).await;
            store.pending.push(&bob, seq, 2).await.unwrap();
        }

        assert_eq!(store.pending.lost(&bob).await.unwrap(), 1);
        let left: Vec<Vec<u8>> = store
            .pending
            .records(&bob)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.ciphertext)
            .collect();
        assert_eq!(left, vec![b"2".to_vec(), b"3".to_vec()]);
        // Dropped from the queue, never from the log.
        assert_eq!(store.log.count(&bob).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn queues_are_per_peer_and_survive_reopen() {
        let dir = tempdir().unwrap();
        let bob = PeerId::parse("bob-owl").unwrap();
        let eve = PeerId::parse("eve-elk").unwrap();
        {
            let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
            let seq = received(&store, &bob, b"b").await;
            store.pending.push(&bob, seq, 1).await.unwrap();
            let seq = received(&store, &eve, b"e").await;
            store.pending.push(&eve, seq, 1).await.unwrap();
            store.close().await;
        }

        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        assert_eq!(store.pending.len(&bob).await.unwrap(), 1);
        assert_eq!(store.pending.len(&eve).await.unwrap(), 1);
        assert_eq!(store.pending.lost(&bob).await.unwrap(), 0);

        let seqs: Vec<i64> = store.pending.records(&bob).await.unwrap().iter().map(|r| r.seq).collect();
        store.pending.release(&seqs).await.unwrap();
        assert_eq!(store.pending.len(&bob).await.unwrap(), 0);
        assert_eq!(store.pending.len(&eve).await.unwrap(), 1);
    }
}
