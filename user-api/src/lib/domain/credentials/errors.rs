use thiserror::Error;

/// Errors from registration and login.
///
/// `InvalidCredentials` covers both an unknown email and a wrong
/// password; which one happened is only recorded in the log.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Email already exists: {0}")]
    DuplicateEmail(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Password hashing failure: {0}")]
    HashingFailure(String),

    #[error("Token issuance failure: {0}")]
    TokenIssuanceFailure(String),
}
