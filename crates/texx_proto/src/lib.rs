//! texx_proto — what travels between two Texx peers
//!
//! The transport collaborator delivers opaque frames per connection; this
//! crate gives them shape.
//!
//! # Modules
//! - `payload`    — the two message kinds (`key`, `text`) and their JSON codec
//! - `peer`       — peer identifiers and per-connection context
//! - `transport`  — transport events and the collaborator's error taxonomy
//! - `error`      — decode errors

pub mod error;
pub mod payload;
pub mod peer;
pub mod transport;

pub use error::ProtoError;
pub use payload::ChatPayload;
pub use peer::{ConnectionContext, PeerId};
pub use transport::{TransportError, TransportEvent};
