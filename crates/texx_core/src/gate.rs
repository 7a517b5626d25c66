//! SessionGate: PIN entry, identity create/unlock and the lockout wipe.
//!
//! ```text
//! NoVault  -> AwaitingPinCreate -> Unlocked
//! HasVault -> AwaitingPinUnlock -> Unlocked
//!                               -> AwaitingPinUnlock { failures + 1 }
//!                               -> Wiping -> Wiped (-> NoVault on re-evaluate)
//! ```
//!
//! `Unlocked` is terminal for the process. State changes are published on a
//! watch channel; `Wiping` is published before the reset runs.

use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use texx_crypto::Passphrase;
use texx_proto::PeerId;
use texx_store::{Store, StoreError};

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::messenger::{AccountState, Messenger};
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NoVault,
    AwaitingPinCreate,
    HasVault,
    AwaitingPinUnlock { failures: u32 },
    Unlocked { peer_id: PeerId },
    Wiping,
    Wiped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneration {
    Create,
    Unlock,
}

pub struct SessionGate {
    config: CoreConfig,
    store: Store,
    transport: Arc<dyn Transport>,
    account: Arc<Mutex<AccountState>>,
    messenger: SyncMutex<Option<Messenger>>,
    state: watch::Sender<SessionState>,
}

impl SessionGate {
    pub async fn open(config: CoreConfig, transport: Arc<dyn Transport>) -> Result<Self, CoreError> {
        let store = Store::open(&config.data_dir, config.kdf).await?;
        let initial = match store.vault.exists() {
            Ok(true) => SessionState::HasVault,
            Ok(false) => SessionState::NoVault,
            // Still somebody's identity; only an explicit wipe may remove it.
            Err(StoreError::Corrupt(why)) => {
                warn!("vault record unreadable: {why}");
                SessionState::HasVault
            }
            Err(e) => return Err(e.into()),
        };
        let (state, _) = watch::channel(initial);
        Ok(Self {
            account: Arc::new(Mutex::new(AccountState::new(config.pending_limit))),
            config,
            store,
            transport,
            messenger: SyncMutex::new(None),
            state,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    fn publish(&self, next: SessionState) {
        self.state.send_replace(next);
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The handle this device uses, if one was chosen.
    pub fn handle(&self) -> Result<Option<PeerId>, CoreError> {
        Ok(self.store.vault.remembered_peer_id()?)
    }

    /// Remember `proposed` as this device's handle unless one already
    /// exists; returns the handle in effect. Handles are never regenerated.
    pub async fn choose_handle(&self, proposed: &str) -> Result<PeerId, CoreError> {
        let _queue = self.account.lock().await;
        if let Some(existing) = self.store.vault.remembered_peer_id()? {
            return Ok(existing);
        }
        let handle = PeerId::parse_handle(proposed)?;
        self.store.vault.remember_peer_id(&handle)?;
        info!(peer_id = %handle, "handle chosen");
        Ok(handle)
    }

    /// Whether the next PIN creates a new identity or unlocks the stored one.
    pub fn evaluate_needs_key_generation(&self) -> Result<KeyGeneration, CoreError> {
        if self.messenger.lock().is_some() {
            return Ok(KeyGeneration::Unlock);
        }
        if self.store.vault.exists()? {
            let failures = self.failures_so_far()?;
            self.publish(SessionState::AwaitingPinUnlock { failures });
            Ok(KeyGeneration::Unlock)
        } else {
            self.publish(SessionState::AwaitingPinCreate);
            Ok(KeyGeneration::Create)
        }
    }

    /// Consecutive failures on record. An unreadable counter reads as one
    /// short of the limit: the next wrong PIN wipes.
    fn failures_so_far(&self) -> Result<u32, CoreError> {
        match self.store.attempts.failures() {
            Ok(failures) => Ok(failures),
            Err(StoreError::Corrupt(why)) => {
                warn!("attempt counter unreadable: {why}");
                Ok(self.config.max_pin_attempts.saturating_sub(1))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create or unlock the identity with `pin`.
    ///
    /// After `max_pin_attempts` consecutive wrong PINs the account is wiped
    /// and `Wiped` is returned. A wrong PIN while the counter is unreadable
    /// wipes as well. An identity that unlocks but does not match
    /// this device's handle is reported without counting as an attempt.
    pub async fn submit_pin(&self, pin: &str) -> Result<Messenger, CoreError> {
        let existing = self.messenger.lock().clone();
        if let Some(messenger) = existing {
            return Ok(messenger);
        }
        let passphrase = Passphrase::from_pin(pin)?;
        let _queue = self.account.lock().await;

        let identity = if self.store.vault.exists()? {
            self.unlock(&passphrase).await?
        } else {
            let handle = self.store.vault.remembered_peer_id()?.ok_or(CoreError::NoHandle)?;
            self.store.vault.create(&handle, &passphrase)?
        };
        self.store.attempts.clear()?;

        let messenger = Messenger::new(
            identity,
            self.store.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.account),
        );
        *self.messenger.lock() = Some(messenger.clone());
        self.publish(SessionState::Unlocked {
            peer_id: messenger.peer_id().clone(),
        });
        Ok(messenger)
    }

    async fn unlock(&self, passphrase: &Passphrase) -> Result<texx_store::Identity, CoreError> {
        match self.store.vault.unlock(passphrase) {
            Ok(identity) => Ok(identity),
            Err(StoreError::WrongPassphrase) => {
                let max = self.config.max_pin_attempts;
                let failures = match self.store.attempts.record_failure() {
                    Ok(failures) => failures,
                    Err(StoreError::Corrupt(why)) => {
                        warn!("attempt counter unreadable, counting as exhausted: {why}");
                        max
                    }
                    Err(e) => return Err(e.into()),
                };
                if failures >= max {
                    warn!(failures, "wrong PIN limit reached, wiping account");
                    self.publish(SessionState::Wiping);
                    self.store.vault.reset().await?;
                    self.publish(SessionState::Wiped);
                    return Err(CoreError::Wiped);
                }
                warn!(failures, max, "wrong PIN");
                self.publish(SessionState::AwaitingPinUnlock { failures });
                Err(CoreError::WrongPassphrase {
                    attempts_left: max - failures,
                })
            }
            Err(StoreError::IdentityNotVerified(why)) => {
                warn!("identity not verified: {why}");
                Err(CoreError::IdentityNotVerified(why))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// User-initiated wipe. Works whether or not the identity is unlocked.
    pub async fn delete_account(&self) -> Result<(), CoreError> {
        let messenger = self.messenger.lock().take();
        self.publish(SessionState::Wiping);
        match messenger {
            Some(messenger) => messenger.delete_account().await?,
            None => {
                let _queue = self.account.lock().await;
                self.store.vault.reset().await?;
            }
        }
        self.publish(SessionState::Wiped);
        Ok(())
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}
