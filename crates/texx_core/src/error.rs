use texx_crypto::CryptoError;
use texx_proto::{PeerId, ProtoError, TransportError};
use texx_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("An identity already exists on this device")]
    VaultAlreadyExists,

    #[error("No identity on this device")]
    NoVault,

    #[error("No handle chosen for this device yet")]
    NoHandle,

    #[error("Wrong PIN ({attempts_left} attempts left before the account is wiped)")]
    WrongPassphrase { attempts_left: u32 },

    #[error("Identity not verified: {0}")]
    IdentityNotVerified(String),

    #[error("Too many wrong PINs: account wiped")]
    Wiped,

    #[error("Message could not be decrypted")]
    DecryptionFailed,

    #[error("No public key known for {0} yet")]
    UnknownRecipientKey(PeerId),

    #[error("Transport: {0}")]
    Transport(#[from] TransportError),

    #[error("Frame from {got:?} arrived on the connection to {expected}")]
    PeerMismatch { expected: PeerId, got: String },

    #[error("Invalid peer id: {0:?}")]
    InvalidPeerId(String),

    #[error("Protocol error: {0}")]
    Proto(ProtoError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ProtoError> for CoreError {
    fn from(e: ProtoError) -> Self {
        match e {
            ProtoError::InvalidPeerId(id) => Self::InvalidPeerId(id),
            other => Self::Proto(other),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VaultAlreadyExists => Self::VaultAlreadyExists,
            StoreError::NoVault => Self::NoVault,
            StoreError::WrongPassphrase => Self::WrongPassphrase { attempts_left: 0 },
            StoreError::IdentityNotVerified(why) => Self::IdentityNotVerified(why),
            StoreError::Proto(p) => p.into(),
            other => Self::Store(other),
        }
    }
}
