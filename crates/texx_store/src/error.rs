use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] texx_crypto::CryptoError),

    #[error("Protocol error: {0}")]
    Proto(#[from] texx_proto::ProtoError),

    #[error("An identity vault already exists")]
    VaultAlreadyExists,

    #[error("No identity vault on this device")]
    NoVault,

    #[error("Passphrase is wrong")]
    WrongPassphrase,

    #[error("Identity not verified: {0}")]
    IdentityNotVerified(String),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),
}
