use thiserror::Error;

/// Error type for password operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    #[error("Malformed password digest: {0}")]
    MalformedDigest(String),

    #[error("Invalid hashing cost: {0}")]
    InvalidCost(String),
}
