use tempfile::tempdir;

use texx_crypto::{message, IdentityKeyPair, KdfParams, Passphrase};
use texx_proto::PeerId;
use texx_store::{Direction, Store};

#[tokio::test]
async fn history_replays_both_directions_in_append_order() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
    let me = IdentityKeyPair::generate().unwrap();
    let bob_keys = IdentityKeyPair::generate().unwrap();
    let bob = PeerId::parse("bob-owl").unwrap();
    store.contacts.put(&bob, &bob_keys.public).await.unwrap();

    let incoming = message::encrypt(b"from bob", &me.public, &bob_keys).unwrap();
    let outgoing = message::encrypt(b"to bob", &bob_keys.public, &me).unwrap();
    let stray = IdentityKeyPair::generate().unwrap();
    let foreign = message::encrypt(b"not for us", &stray.public, &bob_keys).unwrap();

    store.log.append(&bob, &incoming, Direction::Received).await.unwrap();
    store.log.append(&bob, &foreign, Direction::Received).await.unwrap();
    store.log.append(&bob, &outgoing, Direction::Sent).await.unwrap();

    let mut history = store.log.history(&bob, &store.contacts, &me).await.unwrap();
    let first = history.next().unwrap();
    assert_eq!(first.plaintext, "from bob");
    assert_eq!(first.direction, Direction::Received);
    let second = history.next().unwrap();
    assert_eq!(second.plaintext, "to bob");
    assert_eq!(second.direction, Direction::Sent);
    assert!(history.next().is_none());
    assert_eq!(history.failures(), 1);
}

#[tokio::test]
async fn reset_wipes_vault_contacts_and_log() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
    let alice = PeerId::parse("alice-bee-cat").unwrap();
    let bob = PeerId::parse("bob-owl").unwrap();

    store.vault.create(&alice, &Passphrase::from_pin("1234").unwrap()).unwrap();
    store.contacts.put(&bob, &IdentityKeyPair::generate().unwrap().public).await.unwrap();
    store.log.append(&bob, b"ct", Direction::Sent).await.unwrap();
    let queued = store.log.append(&bob, b"early", Direction::Received).await.unwrap();
    store.pending.push(&bob, queued.seq, 8).await.unwrap();
    store.attempts.record_failure().unwrap();

    store.vault.reset().await.unwrap();

    assert!(!store.vault.exists().unwrap());
    assert!(store.contacts.list().await.unwrap().is_empty());
    assert_eq!(store.log.count(&bob).await.unwrap(), 0);
    assert_eq!(store.pending.len(&bob).await.unwrap(), 0);
    assert_eq!(store.attempts.failures().unwrap(), 0);

    // First run again, same handle.
    let again = store.vault.create(&alice, &Passphrase::from_pin("9999").unwrap()).unwrap();
    assert_eq!(again.peer_id, alice);
}

#[tokio::test]
async fn keyed_hash_pin_unlocks_after_reopen() {
    let dir = tempdir().unwrap();
    let alice = PeerId::parse("alice-bee-cat").unwrap();
    let created = {
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        let id = store.vault.create(&alice, &Passphrase::from_pin("1234").unwrap()).unwrap();
        store.close().await;
        id
    };

    let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
    let unlocked = store.vault.unlock(&Passphrase::from_pin("1234").unwrap()).unwrap();
    assert_eq!(unlocked.peer_id, alice);
    assert_eq!(unlocked.keys.public, created.keys.public);
    assert_eq!(store.vault.stored_public_key().unwrap(), created.keys.public);
}
