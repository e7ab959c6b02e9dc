//! Authentication utilities library
//!
//! Provides the credential and token primitives used by the API service:
//! - Password hashing (Argon2id, configurable work factor)
//! - Access token issuance and verification (HS256 JWT)
//! - Authentication coordination
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::PasswordHasher;
//!
//! let hasher = PasswordHasher::new();
//! let hash = hasher.hash("my_password").unwrap();
//! assert!(hasher.verify("my_password", &hash).unwrap());
//! assert!(!hasher.verify("other_password", &hash).unwrap());
//! ```
//!
//! ## Tokens
//! ```
//! use auth::TokenCodec;
//! use chrono::Duration;
//!
//! let codec = TokenCodec::new(b"secret_key_at_least_32_bytes_long!", Duration::hours(24));
//! let issued = codec.issue(42, "alice@example.com").unwrap();
//! let claims = codec.verify(&issued.access_token).unwrap();
//! assert_eq!(claims.sub, "42");
//! ```
//!
//! ## Complete Authentication Flow
//! ```
//! use auth::{Authenticator, PasswordHasher, TokenCodec};
//! use chrono::Duration;
//!
//! let auth = Authenticator::new(
//!     PasswordHasher::new(),
//!     TokenCodec::new(b"secret_key_at_least_32_bytes_long!", Duration::hours(24)),
//! );
//!
//! // Register: hash password
//! let hash = auth.hash_password("password123").unwrap();
//!
//! // Login: verify and issue token
//! let issued = auth.authenticate("password123", &hash, 42, "alice@example.com").unwrap();
//!
//! // Validate token
//! let claims = auth.validate_token(&issued.access_token).unwrap();
//! assert_eq!(claims.email, "alice@example.com");
//! ```

pub mod authenticator;
pub mod jwt;
pub mod password;

// Re-export commonly used items
pub use authenticator::AuthenticationError;
pub use authenticator::Authenticator;
pub use jwt::Claims;
pub use jwt::IssuedToken;
pub use jwt::JwtError;
pub use jwt::TokenCodec;
pub use password::HashingCost;
pub use password::PasswordError;
pub use password::PasswordHasher;
