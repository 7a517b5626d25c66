//! Messenger: the unlocked account.
//!
//! Sending is lookup key → encrypt → transport → append, so a failure at any
//! step leaves persisted state as it was. Receiving appends the ciphertext
//! first (arrival order is durability order), then tries to open it; what
//! cannot be opened yet goes to the persisted dead-letter queue and is
//! retried when that peer's key arrives, in this process or a later one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use texx_crypto::{message, PublicKeyBytes};
use texx_proto::{ChatPayload, ConnectionContext, PeerId, TransportEvent};
use texx_store::{models::ContactRow, Direction, History, HistoryEntry, Identity, KeyChange, Store};

use crate::error::CoreError;
use crate::transport::Transport;

/// State behind the account write queue.
pub(crate) struct AccountState {
    pub(crate) pending_limit: usize,
}

impl AccountState {
    pub(crate) fn new(pending_limit: usize) -> Self {
        Self { pending_limit }
    }
}

/// A received text message, decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub peer: PeerId,
    pub plaintext: String,
    pub timestamp: i64,
}

/// What an inbound frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Text opened immediately.
    Text(Delivered),
    /// Text stored but the sender's key is not known yet.
    Deferred { queued: usize },
    /// Key-transfer stored; previously queued texts that now open, in
    /// arrival order, and how many were ever dropped from the queue.
    KeyStored {
        change: KeyChange,
        released: Vec<Delivered>,
        lost: u64,
    },
    /// Connection opened: our key was sent and the stored conversation
    /// replayed.
    Opened {
        history: Vec<HistoryEntry>,
        failed: usize,
    },
}

#[derive(Clone)]
pub struct Messenger {
    inner: Arc<Inner>,
}

struct Inner {
    identity: Identity,
    store: Store,
    transport: Arc<dyn Transport>,
    account: Arc<Mutex<AccountState>>,
    wiped: AtomicBool,
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("peer_id", self.peer_id())
            .finish_non_exhaustive()
    }
}

impl Messenger {
    pub(crate) fn new(
        identity: Identity,
        store: Store,
        transport: Arc<dyn Transport>,
        account: Arc<Mutex<AccountState>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                identity,
                store,
                transport,
                account,
                wiped: AtomicBool::new(false),
            }),
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.inner.identity.peer_id
    }

    pub fn public_key(&self) -> &PublicKeyBytes {
        self.inner.identity.public_key()
    }

    pub fn fingerprint(&self) -> String {
        self.public_key().fingerprint()
    }

    fn ensure_live(&self) -> Result<(), CoreError> {
        if self.inner.wiped.load(Ordering::SeqCst) {
            return Err(CoreError::Wiped);
        }
        Ok(())
    }

    /// Encrypt for `ctx.peer`, send, then log. Returns the log timestamp.
    pub async fn send_text(&self, ctx: &ConnectionContext, plaintext: &str) -> Result<i64, CoreError> {
        self.ensure_live()?;
        let _queue = self.inner.account.lock().await;
        let store = &self.inner.store;

        let key = store
            .contacts
            .get(&ctx.peer)
            .await?
            .ok_or_else(|| CoreError::UnknownRecipientKey(ctx.peer.clone()))?;
        let ciphertext = message::encrypt(plaintext.as_bytes(), &key, &self.inner.identity.keys)?;

        self.inner
            .transport
            .send(ctx, &ChatPayload::text(&ciphertext))
            .await?;
        let appended = store.log.append(&ctx.peer, &ciphertext, Direction::Sent).await?;
        debug!(peer = %ctx.peer, token = %ctx.token, seq = appended.seq, "text sent");
        Ok(appended.timestamp)
    }

    /// Send our public key on `ctx` (key-transfer).
    pub async fn send_key(&self, ctx: &ConnectionContext) -> Result<(), CoreError> {
        self.ensure_live()?;
        self.inner
            .transport
            .send(ctx, &ChatPayload::key(self.public_key()))
            .await?;
        debug!(peer = %ctx.peer, token = %ctx.token, "public key sent");
        Ok(())
    }

    /// Handle one wire frame that arrived on the connection to `ctx.peer`.
    pub async fn on_incoming(&self, ctx: &ConnectionContext, bytes: &[u8]) -> Result<Incoming, CoreError> {
        self.ensure_live()?;
        match ChatPayload::from_bytes(bytes)? {
            payload @ ChatPayload::Key(_) => {
                let key = payload.public_key()?;
                self.store_key(&ctx.peer, &key).await
            }
            payload @ ChatPayload::Text(_) => {
                let ciphertext = payload.ciphertext()?;
                self.receive_text(&ctx.peer, ciphertext).await
            }
        }
    }

    async fn store_key(&self, peer: &PeerId, key: &PublicKeyBytes) -> Result<Incoming, CoreError> {
        let _queue = self.inner.account.lock().await;
        let store = &self.inner.store;
        let change = store.contacts.put(peer, key).await?;

        let mut released = Vec::new();
        let mut opened = Vec::new();
        let mut still_failing = 0usize;
        for record in store.pending.records(peer).await? {
            match self.open(key, &record.ciphertext) {
                Ok(plaintext) => {
                    opened.push(record.seq);
                    released.push(Delivered {
                        peer: peer.clone(),
                        plaintext,
                        timestamp: record.timestamp,
                    });
                }
                Err(_) => still_failing += 1,
            }
        }
        store.pending.release(&opened).await?;
        if still_failing > 0 {
            warn!(peer = %peer, count = still_failing, "queued messages still undecryptable with new key");
        }
        if !released.is_empty() {
            info!(peer = %peer, count = released.len(), "released queued messages");
        }

        Ok(Incoming::KeyStored {
            change,
            released,
            lost: store.pending.lost(peer).await?,
        })
    }

    async fn receive_text(&self, peer: &PeerId, ciphertext: Vec<u8>) -> Result<Incoming, CoreError> {
        let account = self.inner.account.lock().await;
        let store = &self.inner.store;
        let appended = store.log.append(peer, &ciphertext, Direction::Received).await?;

        let Some(key) = store.contacts.get(peer).await? else {
            store.pending.push(peer, appended.seq, account.pending_limit).await?;
            debug!(peer = %peer, seq = appended.seq, "sender key unknown, message queued");
            return Ok(Incoming::Deferred {
                queued: store.pending.len(peer).await?,
            });
        };

        match self.open(&key, &ciphertext) {
            Ok(plaintext) => Ok(Incoming::Text(Delivered {
                peer: peer.clone(),
                plaintext,
                timestamp: appended.timestamp,
            })),
            Err(e) => {
                warn!(peer = %peer, seq = appended.seq, "message did not decrypt with stored key, queued for retry");
                store.pending.push(peer, appended.seq, account.pending_limit).await?;
                Err(e)
            }
        }
    }

    fn open(&self, key: &PublicKeyBytes, ciphertext: &[u8]) -> Result<String, CoreError> {
        let plaintext = message::decrypt(ciphertext, key, &self.inner.identity.keys)
            .map_err(|_| CoreError::DecryptionFailed)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| CoreError::DecryptionFailed)
    }

    /// Dispatch a transport event for the connection `ctx`.
    ///
    /// `Open` triggers key-transfer and history replay. `Data` must come
    /// from the peer the connection was opened for.
    pub async fn handle_event(
        &self,
        ctx: &ConnectionContext,
        event: TransportEvent,
    ) -> Result<Option<Incoming>, CoreError> {
        match event {
            TransportEvent::Open => {
                self.send_key(ctx).await?;
                let (history, failed) = self.history_report(&ctx.peer).await?;
                Ok(Some(Incoming::Opened { history, failed }))
            }
            TransportEvent::Data { from, bytes } => {
                if from != ctx.peer.as_str() {
                    return Err(CoreError::PeerMismatch {
                        expected: ctx.peer.clone(),
                        got: from,
                    });
                }
                self.on_incoming(ctx, &bytes).await.map(Some)
            }
            TransportEvent::Error(e) => {
                warn!(peer = %ctx.peer, token = %ctx.token, "transport error: {e}");
                Err(CoreError::Transport(e))
            }
            TransportEvent::Closed => {
                debug!(peer = %ctx.peer, token = %ctx.token, "connection closed");
                Ok(None)
            }
        }
    }

    /// Lazy decrypting replay of the log for `peer`. See [`History`].
    pub async fn history(&self, peer: &PeerId) -> Result<History<'_>, CoreError> {
        self.ensure_live()?;
        let store = &self.inner.store;
        Ok(store
            .log
            .history(peer, &store.contacts, &self.inner.identity.keys)
            .await?)
    }

    /// Collected history plus the number of records that failed to open.
    pub async fn history_report(&self, peer: &PeerId) -> Result<(Vec<HistoryEntry>, usize), CoreError> {
        Ok(self.history(peer).await?.into_report())
    }

    pub async fn contacts(&self) -> Result<Vec<ContactRow>, CoreError> {
        self.ensure_live()?;
        Ok(self.inner.store.contacts.list().await?)
    }

    /// Received messages from `peer` still waiting for a usable key.
    pub async fn pending_count(&self, peer: &PeerId) -> Result<usize, CoreError> {
        Ok(self.inner.store.pending.len(peer).await?)
    }

    /// Destroy the vault, contacts and log. This handle is unusable afterwards.
    pub async fn delete_account(&self) -> Result<(), CoreError> {
        let _queue = self.inner.account.lock().await;
        self.inner.store.vault.reset().await?;
        self.inner.wiped.store(true, Ordering::SeqCst);
        info!(peer_id = %self.peer_id(), "account deleted");
        Ok(())
    }
}
