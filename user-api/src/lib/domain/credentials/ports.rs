use async_trait::async_trait;

use crate::domain::credentials::errors::AuthError;
use crate::domain::credentials::models::AuthSession;
use crate::domain::credentials::models::LoginCommand;
use crate::domain::credentials::models::RegisterCommand;

/// Port for credential operations.
#[async_trait]
pub trait CredentialServicePort: Send + Sync + 'static {
    /// Create an account and issue its first token.
    ///
    /// # Errors
    /// * `DuplicateEmail` - Email is already registered
    /// * `StorageFailure` - Lookup or insert failed
    /// * `HashingFailure` - Password hashing failed
    /// * `TokenIssuanceFailure` - Token signing failed
    async fn register(&self, command: RegisterCommand) -> Result<AuthSession, AuthError>;

    /// Verify credentials and issue a token.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown email or wrong password
    /// * `StorageFailure` - Lookup failed
    /// * `HashingFailure` - Stored digest is unusable
    /// * `TokenIssuanceFailure` - Token signing failed
    async fn login(&self, command: LoginCommand) -> Result<AuthSession, AuthError>;
}
