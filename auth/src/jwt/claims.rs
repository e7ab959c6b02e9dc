use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Identity claims carried by an access token.
///
/// Every field is mandatory on the wire: a token missing any of them
/// does not decode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user identifier)
    pub sub: String,

    /// Email of the subject at issuance time
    pub email: String,

    /// Issued at (Unix timestamp). Informational only.
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create claims for a subject issued at `issued_at` and valid for `ttl`.
    pub fn new(
        subject: impl ToString,
        email: impl ToString,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let iat = issued_at.timestamp();

        Self {
            sub: subject.to_string(),
            email: email.to_string(),
            iat,
            exp: iat + ttl.num_seconds(),
        }
    }

    /// Check if the token is expired at `current_timestamp`.
    ///
    /// A token is valid strictly before `exp`.
    pub fn is_expired(&self, current_timestamp: i64) -> bool {
        current_timestamp >= self.exp
    }

    /// Expiration as a UTC datetime.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.exp, 0)
    }
}
