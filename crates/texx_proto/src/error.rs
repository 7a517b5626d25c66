use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Payload too large: {0} bytes")]
    TooLarge(usize),

    #[error("Invalid payload data: {0}")]
    InvalidData(String),

    #[error("Invalid peer id: {0:?}")]
    InvalidPeerId(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] texx_crypto::CryptoError),
}
