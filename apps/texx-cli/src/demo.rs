//! `texx demo`: two accounts in a temp dir, wired through `MemoryNetwork`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc::UnboundedReceiver;

use texx_core::{CoreConfig, Inbound, Incoming, MemoryNetwork, Messenger, SessionGate};
use texx_crypto::KdfParams;
use texx_proto::{ConnectionContext, PeerId};

struct DemoPeer {
    id: PeerId,
    messenger: Messenger,
    inbox: UnboundedReceiver<Inbound>,
    connections: HashMap<PeerId, ConnectionContext>,
    _gate: SessionGate,
}

impl DemoPeer {
    async fn start(net: &MemoryNetwork, root: &Path, handle: &str) -> Result<Self> {
        let id = PeerId::parse_handle(handle)?;
        let (transport, inbox) = net.register(&id)?;
        // Throwaway accounts: cheap KDF costs.
        let config = CoreConfig::for_dir(root.join(handle)).with_kdf(KdfParams::minimal());
        let gate = SessionGate::open(config, Arc::new(transport)).await?;
        gate.evaluate_needs_key_generation()?;
        gate.choose_handle(handle).await?;
        let messenger = gate.submit_pin("1234").await?;
        println!("{id} fingerprint {}", messenger.fingerprint());
        Ok(Self {
            id,
            messenger,
            inbox,
            connections: HashMap::new(),
            _gate: gate,
        })
    }

    fn ctx(&mut self, peer: &PeerId) -> ConnectionContext {
        self.connections
            .entry(peer.clone())
            .or_insert_with(|| ConnectionContext::new(peer.clone()))
            .clone()
    }

    /// Process everything currently queued for this peer.
    async fn drain(&mut self) -> Result<()> {
        while let Ok(inbound) = self.inbox.try_recv() {
            let ctx = self.ctx(&inbound.from);
            match self.messenger.handle_event(&ctx, inbound.event).await? {
                Some(Incoming::Text(delivered)) => {
                    println!("  {} <- {}: {}", self.id, delivered.peer, delivered.plaintext)
                }
                Some(Incoming::KeyStored { released, .. }) => {
                    println!("  {} stored key of {}", self.id, ctx.peer);
                    for delivered in released {
                        println!("  {} <- {} (queued): {}", self.id, delivered.peer, delivered.plaintext);
                    }
                }
                Some(Incoming::Deferred { .. }) => println!("  {} queued a message from {}", self.id, ctx.peer),
                Some(Incoming::Opened { history, .. }) => {
                    println!("  {} connected to {} ({} earlier messages)", self.id, ctx.peer, history.len())
                }
                None => {}
            }
        }
        Ok(())
    }

    async fn say(&mut self, to: &PeerId, text: &str) -> Result<()> {
        let ctx = self.ctx(to);
        self.messenger.send_text(&ctx, text).await?;
        println!("  {} -> {to}: {text}", self.id);
        Ok(())
    }
}

pub async fn run() -> Result<()> {
    let root = tempfile::tempdir()?;
    let net = MemoryNetwork::new();
    let mut alice = DemoPeer::start(&net, root.path(), "alice-bee-cat").await?;
    let mut bob = DemoPeer::start(&net, root.path(), "bob-owl-fox").await?;

    net.connect(&alice.id, &bob.id)?;
    // Open: both sides send their key, then read the other's.
    alice.drain().await?;
    bob.drain().await?;
    alice.drain().await?;

    let bob_id = bob.id.clone();
    let alice_id = alice.id.clone();
    alice.say(&bob_id, "hello bob").await?;
    alice.say(&bob_id, "keys are exchanged on connect").await?;
    bob.drain().await?;
    bob.say(&alice_id, "hi alice, all decrypted here").await?;
    alice.drain().await?;

    println!("history of {alice_id} with {bob_id}:");
    let (entries, failed) = alice.messenger.history_report(&bob_id).await?;
    for entry in &entries {
        crate::print_entry(&bob_id, &alice_id, entry);
    }
    if failed > 0 {
        println!("({failed} undecryptable)");
    }
    Ok(())
}
