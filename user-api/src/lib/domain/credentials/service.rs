use std::sync::Arc;

use async_trait::async_trait;
use auth::AuthenticationError;
use auth::Authenticator;

use crate::domain::credentials::errors::AuthError;
use crate::domain::credentials::models::AuthSession;
use crate::domain::credentials::models::LoginCommand;
use crate::domain::credentials::models::RegisterCommand;
use crate::domain::credentials::ports::CredentialServicePort;
use crate::domain::user::models::NewUser;
use crate::user::errors::UserError;
use crate::user::ports::UserRepository;

/// Registration and login over a user store.
pub struct CredentialService<UR>
where
    UR: UserRepository,
{
    repository: Arc<UR>,
    authenticator: Arc<Authenticator>,
}

impl<UR> CredentialService<UR>
where
    UR: UserRepository,
{
    pub fn new(repository: Arc<UR>, authenticator: Arc<Authenticator>) -> Self {
        Self {
            repository,
            authenticator,
        }
    }
}

#[async_trait]
impl<UR> CredentialServicePort for CredentialService<UR>
where
    UR: UserRepository,
{
    async fn register(&self, command: RegisterCommand) -> Result<AuthSession, AuthError> {
        let existing = self
            .repository
            .find_by_email(&command.email)
            .await
            .map_err(|e| AuthError::StorageFailure(e.to_string()))?;
        if existing.is_some() {
            return Err(AuthError::DuplicateEmail(command.email.to_string()));
        }

        let authenticator = Arc::clone(&self.authenticator);
        let password = command.password;
        let password_hash =
            tokio::task::spawn_blocking(move || authenticator.hash_password(password.expose()))
                .await
                .map_err(|e| AuthError::HashingFailure(e.to_string()))?
                .map_err(|e| AuthError::HashingFailure(e.to_string()))?;

        // The store enforces uniqueness too; a concurrent registration that
        // slipped past the lookup surfaces here.
        let user = self
            .repository
            .create(NewUser {
                email: command.email,
                name: command.name,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                UserError::EmailAlreadyExists(email) => AuthError::DuplicateEmail(email),
                other => AuthError::StorageFailure(other.to_string()),
            })?;

        let token = self
            .authenticator
            .issue_token(user.id, user.email.as_str())
            .map_err(|e| AuthError::TokenIssuanceFailure(e.to_string()))?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(AuthSession { user, token })
    }

    async fn login(&self, command: LoginCommand) -> Result<AuthSession, AuthError> {
        let user = match self.repository.find_by_email(&command.email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::info!(reason = "unknown_email", "Login rejected");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(AuthError::StorageFailure(e.to_string())),
        };

        let authenticator = Arc::clone(&self.authenticator);
        let password = command.password;
        let stored_hash = user.password_hash.clone();
        let (user_id, email) = (user.id, user.email.to_string());
        let outcome = tokio::task::spawn_blocking(move || {
            authenticator.authenticate(password.expose(), &stored_hash, user_id, &email)
        })
        .await
        .map_err(|e| AuthError::HashingFailure(e.to_string()))?;

        let token = outcome.map_err(|e| match e {
            AuthenticationError::InvalidCredentials => {
                tracing::info!(user_id = %user.id, reason = "wrong_password", "Login rejected");
                AuthError::InvalidCredentials
            }
            AuthenticationError::PasswordError(err) => AuthError::HashingFailure(err.to_string()),
            AuthenticationError::JwtError(err) => AuthError::TokenIssuanceFailure(err.to_string()),
        })?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(AuthSession { user, token })
    }
}
