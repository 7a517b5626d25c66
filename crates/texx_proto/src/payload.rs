//! Inbound/outbound frame body.
//!
//! On the wire a frame is a JSON object `{"type": "...", "data": "..."}`:
//!   - `key`  — `data` is the sender's base64url identity public key
//!   - `text` — `data` is base64url ciphertext from `texx_crypto::message`

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use texx_crypto::PublicKeyBytes;

use crate::error::ProtoError;

/// Frames above this size are rejected before parsing.
pub const MAX_FRAME_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatPayload {
    Key(String),
    Text(String),
}

impl ChatPayload {
    /// Key-transfer frame for the local public key.
    pub fn key(public: &PublicKeyBytes) -> Self {
        Self::Key(public.to_b64())
    }

    pub fn text(ciphertext: &[u8]) -> Self {
        Self::Text(URL_SAFE_NO_PAD.encode(ciphertext))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Key(_) => "key",
            Self::Text(_) => "text",
        }
    }

    /// Decoded and validated public key of a `key` frame.
    pub fn public_key(&self) -> Result<PublicKeyBytes, ProtoError> {
        match self {
            Self::Key(b64) => Ok(PublicKeyBytes::from_b64(b64)?),
            Self::Text(_) => Err(ProtoError::InvalidData("expected a key frame".into())),
        }
    }

    /// Raw ciphertext of a `text` frame.
    pub fn ciphertext(&self) -> Result<Vec<u8>, ProtoError> {
        match self {
            Self::Text(b64) => URL_SAFE_NO_PAD
                .decode(b64)
                .map_err(|e| ProtoError::InvalidData(e.to_string())),
            Self::Key(_) => Err(ProtoError::InvalidData("expected a text frame".into())),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(ProtoError::TooLarge(bytes.len()));
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use texx_crypto::IdentityKeyPair;

    #[test]
    fn wire_shape_matches_type_data_object() {
        let frame = ChatPayload::Text("abc".into());
        let json: serde_json::Value = serde_json::from_slice(&frame.to_bytes().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "data": "abc"}));
    }

    #[test]
    fn key_frame_carries_valid_public_key() {
        let id = IdentityKeyPair::generate().unwrap();
        let frame = ChatPayload::from_bytes(&ChatPayload::key(&id.public).to_bytes().unwrap()).unwrap();
        assert_eq!(frame.kind(), "key");
        assert_eq!(frame.public_key().unwrap(), id.public);
        assert!(frame.ciphertext().is_err());
    }

    #[test]
    fn unknown_type_is_malformed() {
        let err = ChatPayload::from_bytes(br#"{"type":"call","data":"x"}"#).unwrap_err();
        assert!(matches!(err, ProtoError::Malformed(_)));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let big = vec![b' '; MAX_FRAME_BYTES + 1];
        assert!(matches!(ChatPayload::from_bytes(&big), Err(ProtoError::TooLarge(_))));
    }
}
