use thiserror::Error;

/// Error taxonomy for the vault engine. Every fallible operation in this crate
/// returns one of these kinds; nothing is swallowed internally.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault is locked")]
    Locked,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cryptographic operation failed: {0}")]
    CryptoFailure(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store is corrupt: {0}")]
    CorruptStore(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;

impl From<std::io::Error> for VaultError {
    fn from(e: std::io::Error) -> Self {
        VaultError::IoError(e.to_string())
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref err, _) = e {
            if err.extended_code == 2067 || err.code == rusqlite::ErrorCode::ConstraintViolation {
                return VaultError::InvalidArgument(format!("uniqueness constraint violated: {e}"));
            }
        }
        VaultError::IoError(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::InvalidArgument(e.to_string())
    }
}

impl From<base64::DecodeError> for VaultError {
    fn from(e: base64::DecodeError) -> Self {
        VaultError::CorruptStore(format!("bad base64 in metadata: {e}"))
    }
}
