use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use jsonwebtoken::crypto;
use jsonwebtoken::decode;
use jsonwebtoken::encode;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;

use super::claims::Claims;
use super::errors::JwtError;

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub claims: Claims,
}

impl IssuedToken {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims.expires_at()
    }
}

/// Issues and verifies HS256 access tokens.
///
/// Holds only the keys and the token lifetime; every call is independent,
/// so one codec can be shared across request handlers.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenCodec {
    const ALGORITHM: Algorithm = Algorithm::HS256;

    /// Create a codec signing with `secret` and issuing tokens valid for `ttl`.
    ///
    /// # Security Notes
    /// - The secret should be at least 256 bits (32 bytes) for HS256
    /// - Store secrets in environment variables or secure vaults, never in code
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Self::ALGORITHM);
        // Expiry is checked in `verify_at` against the caller's clock, with no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Lifetime of issued tokens.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject` valid from now for the configured ttl.
    ///
    /// # Errors
    /// * `SigningFailed` - Token encoding failed
    pub fn issue(&self, subject: impl ToString, email: &str) -> Result<IssuedToken, JwtError> {
        self.issue_at(subject, email, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        subject: impl ToString,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, JwtError> {
        let claims = Claims::new(subject, email, now, self.ttl);

        let access_token = encode(&Header::new(Self::ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| JwtError::SigningFailed(e.to_string()))?;

        Ok(IssuedToken {
            access_token,
            claims,
        })
    }

    /// Verify a token's signature and expiry and return its claims.
    ///
    /// The signature is checked over the raw `header.payload` bytes before
    /// either segment is decoded, so a change to any byte is `BadSignature`.
    ///
    /// # Errors
    /// * `MalformedToken` - Token is not three base64url segments, or claims cannot be parsed
    /// * `BadSignature` - Signature or algorithm does not match
    /// * `Expired` - Signature is valid but the token has expired
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, JwtError> {
        let (message, signature) = split_signed(token)?;

        let signature_matches = crypto::verify(
            signature,
            message.as_bytes(),
            &self.decoding_key,
            Self::ALGORITHM,
        )
        .map_err(classify)?;
        if !signature_matches {
            return Err(JwtError::BadSignature);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(classify)?
            .claims;

        if claims.is_expired(now.timestamp()) {
            return Err(JwtError::Expired);
        }

        Ok(claims)
    }
}

/// Split a compact token into its signed `header.payload` part and its signature.
fn split_signed(token: &str) -> Result<(&str, &str), JwtError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(JwtError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let is_base64url = |b: u8| b.is_ascii_alphanumeric() || b == b'-' || b == b'_';
    if segments
        .iter()
        .any(|segment| segment.is_empty() || !segment.bytes().all(is_base64url))
    {
        return Err(JwtError::MalformedToken(
            "segment is not base64url encoded".to_string(),
        ));
    }

    let signed_len = segments[0].len() + 1 + segments[1].len();
    Ok((&token[..signed_len], segments[2]))
}

fn classify(error: jsonwebtoken::errors::Error) -> JwtError {
    match error.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => JwtError::BadSignature,
        ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::MalformedToken(error.to_string()),
    }
}
