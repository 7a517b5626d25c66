//! texx_core — the account-level API a Texx front end talks to
//!
//! # Flow
//! 1. [`SessionGate::open`] loads the store and reports whether an identity
//!    exists ([`SessionGate::evaluate_needs_key_generation`]).
//! 2. [`SessionGate::submit_pin`] creates or unlocks the identity, enforcing
//!    the wrong-passphrase lockout. Success yields a [`Messenger`].
//! 3. The front end forwards each connection's transport events to
//!    [`Messenger::handle_event`] and calls [`Messenger::send_text`] /
//!    [`Messenger::history`] on user action.
//!
//! Every mutation of one account's persisted state is serialised through a
//! single async mutex shared by the gate and the messenger.

pub mod config;
pub mod error;
pub mod gate;
pub mod messenger;
pub mod transport;

pub use config::CoreConfig;
pub use error::CoreError;
pub use gate::{KeyGeneration, SessionGate, SessionState};
pub use messenger::{Delivered, Incoming, Messenger};
pub use transport::{Inbound, MemoryNetwork, MemoryTransport, Transport};
