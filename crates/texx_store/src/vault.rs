//! IdentityVault: the one passphrase-protected identity record per device.
//!
//! Record (`vault.json`):
//!   - `schema_marker` — "success" once the record is complete
//!   - `peer_id`, `public_key` — readable without the passphrase
//!   - `kdf`, `salt` — Argon2id inputs for the vault key
//!   - `encrypted_private_key` — nonce || XChaCha20-Poly1305(secret || peer_id)
//!
//! The sealed plaintext embeds the handle the identity was created for, so
//! an unlocked key can be checked against the handle remembered on this
//! device (`peer_id` file). A mismatch is `IdentityNotVerified`, distinct
//! from a wrong passphrase.
//!
//! A failed unlock never writes anything.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};
use zeroize::Zeroizing;

use texx_crypto::{aead, kdf, IdentityKeyPair, KdfParams, Passphrase, PublicKeyBytes};
use texx_proto::PeerId;

use crate::error::StoreError;

pub const VAULT_FILE: &str = "vault.json";
pub const PEER_ID_FILE: &str = "peer_id";
pub const SCHEMA_MARKER: &str = "success";
pub const VAULT_VERSION: u32 = 1;
const VAULT_AAD_PREFIX: &[u8] = b"texx-vault-v1";

/// Decrypted identity, available for the rest of the process once unlocked.
#[derive(Debug)]
pub struct Identity {
    pub peer_id: PeerId,
    pub keys: IdentityKeyPair,
}

impl Identity {
    pub fn public_key(&self) -> &PublicKeyBytes {
        &self.keys.public
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    pub schema_marker: String,
    pub version: u32,
    pub peer_id: String,
    /// Base64url Ed25519 public key
    pub public_key: String,
    pub kdf: KdfParams,
    /// Hex-encoded Argon2id salt
    pub salt: String,
    /// Base64url nonce || ciphertext+tag
    pub encrypted_private_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct IdentityVault {
    dir: PathBuf,
    pool: SqlitePool,
    kdf: KdfParams,
}

impl IdentityVault {
    pub fn new(dir: &Path, pool: SqlitePool, kdf: KdfParams) -> Self {
        Self {
            dir: dir.to_path_buf(),
            pool,
            kdf,
        }
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join(VAULT_FILE)
    }

    fn peer_id_path(&self) -> PathBuf {
        self.dir.join(PEER_ID_FILE)
    }

    /// `Ok(true)` iff a complete vault record is present, `Ok(false)` iff
    /// there is no record file at all. A record file that cannot be read as
    /// a complete record is `Corrupt`: it still holds someone's identity.
    pub fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.read_record()?.is_some())
    }

    fn read_record(&self) -> Result<Option<VaultRecord>, StoreError> {
        let path = self.record_path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: VaultRecord = serde_json::from_slice(&data)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?;
        if record.schema_marker != SCHEMA_MARKER {
            return Err(StoreError::Corrupt(format!(
                "{}: incomplete record (marker {:?})",
                path.display(),
                record.schema_marker
            )));
        }
        Ok(Some(record))
    }

    /// Public half of the stored record, without unlocking.
    pub fn stored_public_key(&self) -> Result<PublicKeyBytes, StoreError> {
        let record = self.read_record()?.ok_or(StoreError::NoVault)?;
        Ok(PublicKeyBytes::from_b64(&record.public_key)?)
    }

    /// The handle chosen on first run, if any.
    pub fn remembered_peer_id(&self) -> Result<Option<PeerId>, StoreError> {
        match fs::read_to_string(self.peer_id_path()) {
            Ok(s) => Ok(Some(PeerId::parse(s.trim())?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn remember_peer_id(&self, peer_id: &PeerId) -> Result<(), StoreError> {
        write_private(&self.peer_id_path(), peer_id.as_str().as_bytes())
    }

    /// Generate a fresh identity, seal it under `passphrase` and persist it.
    pub fn create(&self, peer_id: &PeerId, passphrase: &Passphrase) -> Result<Identity, StoreError> {
        // Any record file, readable or not, blocks creation.
        match fs::metadata(self.record_path()) {
            Ok(_) => return Err(StoreError::VaultAlreadyExists),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let keys = IdentityKeyPair::generate()?;
        let salt = kdf::generate_salt();
        let vault_key = kdf::vault_key(passphrase, &salt, self.kdf)?;

        let mut sealed_plaintext = Zeroizing::new(Vec::with_capacity(32 + peer_id.as_str().len()));
        sealed_plaintext.extend_from_slice(keys.secret_bytes());
        sealed_plaintext.extend_from_slice(peer_id.as_str().as_bytes());
        let sealed = aead::encrypt(&vault_key.0, &sealed_plaintext, &vault_aad(&keys.public))?;

        let record = VaultRecord {
            schema_marker: SCHEMA_MARKER.to_string(),
            version: VAULT_VERSION,
            peer_id: peer_id.to_string(),
            public_key: keys.public_b64(),
            kdf: self.kdf,
            salt: hex::encode(salt),
            encrypted_private_key: URL_SAFE_NO_PAD.encode(sealed),
            created_at: Utc::now(),
        };
        write_private(&self.record_path(), &serde_json::to_vec_pretty(&record)?)?;
        self.remember_peer_id(peer_id)?;

        info!(peer_id = %peer_id, fingerprint = %keys.public.fingerprint(), "identity vault created");
        Ok(Identity {
            peer_id: peer_id.clone(),
            keys,
        })
    }

    /// Open the sealed private key with `passphrase` and verify it belongs to
    /// the handle remembered on this device.
    pub fn unlock(&self, passphrase: &Passphrase) -> Result<Identity, StoreError> {
        let record = self.read_record()?.ok_or(StoreError::NoVault)?;
        if record.version != VAULT_VERSION {
            return Err(StoreError::Corrupt(format!("unknown vault version {}", record.version)));
        }
        let stored_public = PublicKeyBytes::from_b64(&record.public_key)?;
        let salt = hex::decode(&record.salt).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let sealed = URL_SAFE_NO_PAD
            .decode(&record.encrypted_private_key)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let vault_key = kdf::vault_key(passphrase, &salt, record.kdf)?;
        let plaintext = aead::decrypt(&vault_key.0, &sealed, &vault_aad(&stored_public))
            .map_err(|_| StoreError::WrongPassphrase)?;
        if plaintext.len() < 32 {
            return Err(StoreError::Corrupt("sealed identity too short".into()));
        }
        let (secret, handle) = plaintext.split_at(32);
        let keys = IdentityKeyPair::from_bytes(secret)?;

        if keys.public != stored_public {
            return Err(StoreError::IdentityNotVerified(
                "private key does not match stored public key".into(),
            ));
        }
        let embedded = std::str::from_utf8(handle)
            .map_err(|_| StoreError::IdentityNotVerified("embedded handle is not UTF-8".into()))?;
        let remembered = self.remembered_peer_id()?.ok_or_else(|| {
            StoreError::IdentityNotVerified("no handle remembered on this device".into())
        })?;
        if embedded != remembered.as_str() || embedded != record.peer_id {
            return Err(StoreError::IdentityNotVerified(format!(
                "identity belongs to {embedded:?}, this device is {remembered}"
            )));
        }

        info!(peer_id = %remembered, "identity vault unlocked");
        Ok(Identity {
            peer_id: remembered,
            keys,
        })
    }

    /// Irreversibly destroy the vault record, all contact keys, the whole
    /// message log and its dead letters. Idempotent. The remembered handle is kept.
    pub async fn reset(&self) -> Result<(), StoreError> {
        remove_if_exists(&self.record_path())?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pending").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM pending_lost").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM contacts").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM messages").execute(&mut *tx).await?;
        tx.commit().await?;

        remove_if_exists(&self.dir.join(crate::attempts::ATTEMPTS_FILE))?;
        warn!("account wiped: vault, contacts and message log destroyed");
        Ok(())
    }
}

fn vault_aad(public: &PublicKeyBytes) -> Vec<u8> {
    let mut aad = VAULT_AAD_PREFIX.to_vec();
    aad.extend_from_slice(public.as_bytes());
    aad
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Atomically replace `path` (temp file + rename), owner-only on Unix.
pub(crate) fn write_private(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Corrupt(format!("no parent for {}", path.display())))?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
    }
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use tempfile::tempdir;

    fn peer(s: &str) -> PeerId {
        PeerId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn create_then_unlock_roundtrip() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        let pass = Passphrase::from_pin("1234").unwrap();

        assert!(!store.vault.exists().unwrap());
        let created = store.vault.create(&peer("alice-bee-cat"), &pass).unwrap();
        assert!(store.vault.exists().unwrap());

        let unlocked = store.vault.unlock(&pass).unwrap();
        assert_eq!(unlocked.peer_id, created.peer_id);
        assert_eq!(unlocked.keys.public, created.keys.public);
        assert_eq!(unlocked.keys.secret_bytes(), created.keys.secret_bytes());
    }

    #[tokio::test]
    async fn second_create_is_refused() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        let pass = Passphrase::new("p");
        store.vault.create(&peer("alice-bee"), &pass).unwrap();
        assert!(matches!(
            store.vault.create(&peer("alice-bee"), &pass),
            Err(StoreError::VaultAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn wrong_passphrase_leaves_record_untouched() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        store.vault.create(&peer("alice-bee"), &Passphrase::new("right")).unwrap();
        let before = fs::read(store.vault.record_path()).unwrap();

        let err = store.vault.unlock(&Passphrase::new("wrong")).unwrap_err();
        assert!(matches!(err, StoreError::WrongPassphrase));
        assert_eq!(fs::read(store.vault.record_path()).unwrap(), before);
    }

    #[tokio::test]
    async fn foreign_handle_is_not_verified() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        let pass = Passphrase::new("pw");
        store.vault.create(&peer("alice-bee"), &pass).unwrap();
        store.vault.remember_peer_id(&peer("mallory-fox")).unwrap();

        let err = store.vault.unlock(&pass).unwrap_err();
        assert!(matches!(err, StoreError::IdentityNotVerified(_)));
    }

    #[tokio::test]
    async fn swapped_public_key_fails_authentication() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        let pass = Passphrase::new("pw");
        store.vault.create(&peer("alice-bee"), &pass).unwrap();

        let mut record: VaultRecord =
            serde_json::from_slice(&fs::read(store.vault.record_path()).unwrap()).unwrap();
        record.public_key = IdentityKeyPair::generate().unwrap().public_b64();
        fs::write(store.vault.record_path(), serde_json::to_vec(&record).unwrap()).unwrap();

        // The public key is bound as associated data
        assert!(store.vault.unlock(&pass).is_err());
    }

    #[tokio::test]
    async fn damaged_record_is_corrupt_and_never_replaced() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        let pass = Passphrase::new("pw");
        store.vault.create(&peer("alice-bee"), &pass).unwrap();

        let mut bytes = fs::read(store.vault.record_path()).unwrap();
        bytes.truncate(bytes.len() - 5);
        fs::write(store.vault.record_path(), &bytes).unwrap();

        assert!(matches!(store.vault.exists(), Err(StoreError::Corrupt(_))));
        assert!(matches!(
            store.vault.create(&peer("alice-bee"), &pass),
            Err(StoreError::VaultAlreadyExists)
        ));
        assert_eq!(fs::read(store.vault.record_path()).unwrap(), bytes);
        assert!(matches!(store.vault.unlock(&pass), Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn incomplete_record_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        store.vault.create(&peer("alice-bee"), &Passphrase::new("pw")).unwrap();

        let mut record: VaultRecord =
            serde_json::from_slice(&fs::read(store.vault.record_path()).unwrap()).unwrap();
        record.schema_marker = "pending".into();
        fs::write(store.vault.record_path(), serde_json::to_vec(&record).unwrap()).unwrap();

        assert!(matches!(store.vault.exists(), Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn reset_is_idempotent_and_keeps_handle() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        store.vault.create(&peer("alice-bee"), &Passphrase::new("pw")).unwrap();

        store.vault.reset().await.unwrap();
        store.vault.reset().await.unwrap();
        assert!(!store.vault.exists().unwrap());
        assert_eq!(store.vault.remembered_peer_id().unwrap(), Some(peer("alice-bee")));
    }
}
