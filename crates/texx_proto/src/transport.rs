//! Transport collaborator boundary: per-connection events and errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the transport/signalling collaborator.  Displayed as-is;
/// never produced by the core itself.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum TransportError {
    #[error("Connection to server lost")]
    Network,

    #[error("Transport is not supported by this client")]
    Incompatible,

    #[error("Peer could not be found")]
    PeerUnavailable,

    #[error("Your ID isn't available")]
    IdUnavailable,

    #[error("Unhandled transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Map a collaborator error kind string onto the taxonomy.
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "network" => Self::Network,
            "browser-incompatible" | "incompatible" => Self::Incompatible,
            "peer-unavailable" => Self::PeerUnavailable,
            "unavailable-id" => Self::IdUnavailable,
            other => Self::Other(other.to_string()),
        }
    }
}

/// What a connection can report, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Channel is ready; the local key should be transferred now.
    Open,
    /// One inbound frame, tagged with the transport-level sender id.
    Data { from: String, bytes: Vec<u8> },
    Error(TransportError),
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_taxonomy() {
        assert_eq!(TransportError::from_kind("network"), TransportError::Network);
        assert_eq!(
            TransportError::from_kind("browser-incompatible"),
            TransportError::Incompatible
        );
        assert_eq!(
            TransportError::from_kind("peer-unavailable"),
            TransportError::PeerUnavailable
        );
        assert_eq!(TransportError::from_kind("unavailable-id"), TransportError::IdUnavailable);
        assert_eq!(
            TransportError::from_kind("server-error"),
            TransportError::Other("server-error".into())
        );
    }
}
