//! Transport seam and an in-process network.
//!
//! The real peer-to-peer layer lives outside this crate. It only has to
//! deliver whole frames per connection and report `open` / `data` / `error`
//! events; the messenger drives everything else.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use texx_proto::{ChatPayload, ConnectionContext, PeerId, TransportError, TransportEvent};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one payload on the connection described by `ctx`.
    async fn send(&self, ctx: &ConnectionContext, payload: &ChatPayload) -> Result<(), TransportError>;
}

/// One event as seen by the receiving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub from: PeerId,
    pub event: TransportEvent,
}

type Mailbox = mpsc::UnboundedSender<Inbound>;

/// Routes frames between peers registered in the same process.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    peers: Arc<Mutex<HashMap<PeerId, Mailbox>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id` on the network. Fails with `IdUnavailable` if taken.
    pub fn register(
        &self,
        id: &PeerId,
    ) -> Result<(MemoryTransport, mpsc::UnboundedReceiver<Inbound>), TransportError> {
        let mut peers = self.peers.lock();
        if peers.contains_key(id) {
            return Err(TransportError::IdUnavailable);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        peers.insert(id.clone(), tx);
        debug!(peer = %id, "registered on memory network");
        Ok((
            MemoryTransport {
                local: id.clone(),
                network: self.clone(),
            },
            rx,
        ))
    }

    pub fn unregister(&self, id: &PeerId) {
        if self.peers.lock().remove(id).is_some() {
            debug!(peer = %id, "left memory network");
        }
    }

    /// Open a connection between `a` and `b`: both sides see `Open`.
    pub fn connect(&self, a: &PeerId, b: &PeerId) -> Result<(), TransportError> {
        let peers = self.peers.lock();
        let to_a = peers.get(a).ok_or(TransportError::PeerUnavailable)?;
        let to_b = peers.get(b).ok_or(TransportError::PeerUnavailable)?;
        deliver(to_a, b, TransportEvent::Open)?;
        deliver(to_b, a, TransportEvent::Open)
    }

    /// Report a transport failure to `to` on its connection with `about`.
    pub fn fail(&self, to: &PeerId, about: &PeerId, error: TransportError) -> Result<(), TransportError> {
        let peers = self.peers.lock();
        let mailbox = peers.get(to).ok_or(TransportError::PeerUnavailable)?;
        deliver(mailbox, about, TransportEvent::Error(error))
    }

    fn route(&self, from: &PeerId, to: &PeerId, bytes: Vec<u8>) -> Result<(), TransportError> {
        let peers = self.peers.lock();
        let mailbox = peers.get(to).ok_or(TransportError::PeerUnavailable)?;
        deliver(
            mailbox,
            from,
            TransportEvent::Data {
                from: from.to_string(),
                bytes,
            },
        )
    }
}

fn deliver(mailbox: &Mailbox, from: &PeerId, event: TransportEvent) -> Result<(), TransportError> {
    mailbox
        .send(Inbound {
            from: from.clone(),
            event,
        })
        .map_err(|_| TransportError::PeerUnavailable)
}

/// A peer's handle on a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    local: PeerId,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn local_id(&self) -> &PeerId {
        &self.local
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, ctx: &ConnectionContext, payload: &ChatPayload) -> Result<(), TransportError> {
        let bytes = payload
            .to_bytes()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        debug!(to = %ctx.peer, token = %ctx.token, kind = payload.kind(), "memory send");
        self.network.route(&self.local, &ctx.peer, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> PeerId {
        PeerId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn frames_reach_the_named_peer() {
        let net = MemoryNetwork::new();
        let (alice, _alice_rx) = net.register(&id("alice-bee")).unwrap();
        let (_bob, mut bob_rx) = net.register(&id("bob-owl")).unwrap();

        let ctx = ConnectionContext::new(id("bob-owl"));
        alice.send(&ctx, &ChatPayload::Text("x".into())).await.unwrap();

        let inbound = bob_rx.recv().await.unwrap();
        assert_eq!(inbound.from, id("alice-bee"));
        match inbound.event {
            TransportEvent::Data { from, bytes } => {
                assert_eq!(from, "alice-bee");
                assert_eq!(ChatPayload::from_bytes(&bytes).unwrap(), ChatPayload::Text("x".into()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_peer_and_taken_id() {
        let net = MemoryNetwork::new();
        let (alice, _rx) = net.register(&id("alice-bee")).unwrap();
        assert!(matches!(net.register(&id("alice-bee")), Err(TransportError::IdUnavailable)));

        let ctx = ConnectionContext::new(id("nobody-here"));
        let err = alice.send(&ctx, &ChatPayload::Text("x".into())).await.unwrap_err();
        assert_eq!(err, TransportError::PeerUnavailable);
        assert_eq!(net.connect(&id("alice-bee"), &id("nobody-here")), Err(TransportError::PeerUnavailable));
    }
}
