//! Peer identifiers.
//!
//! A `PeerId` is the display handle a peer registered with the signalling
//! server (e.g. "alice-bee-cat"). The core only relies on string equality;
//! generation belongs to the identifier collaborator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Any non-empty identifier without whitespace.
    pub fn parse(s: &str) -> Result<Self, ProtoError> {
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(ProtoError::InvalidPeerId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Stricter form for ids typed in by a user: ASCII letters and hyphens,
    /// with at least one hyphen. Empty words are allowed (`alice-`,
    /// `alice--bee`), matching the handles peers already registered.
    pub fn parse_handle(s: &str) -> Result<Self, ProtoError> {
        let well_formed =
            s.contains('-') && s.chars().all(|c| c == '-' || c.is_ascii_alphabetic());
        if !well_formed {
            return Err(ProtoError::InvalidPeerId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State scoped to one transport connection.
///
/// Every crypto/log call receives the remote peer explicitly through this
/// context; there is no process-wide "current peer".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub peer: PeerId,
    /// Correlation token for this connection (the transport's label).
    pub token: String,
}

impl ConnectionContext {
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            token: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_token(peer: PeerId, token: impl Into<String>) -> Self {
        Self {
            peer,
            token: token.into(),
        }
    }
}
