use std::sync::Arc;

use auth::Authenticator;
use auth::JwtError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::extract::Request;
use axum::extract::State;
use axum::http::header;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;

use crate::domain::user::models::UserId;
use crate::inbound::http::handlers::ApiError;

const BEARER_PREFIX: &str = "Bearer ";

/// Identity attached to a request that passed the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub email: String,
}

/// Why a request was turned away. Only [`GateRejection::public_message`]
/// reaches the client; the variant itself is logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    MissingHeader,
    MalformedHeader,
    InvalidToken(JwtError),
    InvalidSubject(String),
}

impl GateRejection {
    pub fn public_message(&self) -> &'static str {
        match self {
            GateRejection::MissingHeader => "Authorization required",
            GateRejection::MalformedHeader => "Malformed authorization header",
            GateRejection::InvalidToken(_) | GateRejection::InvalidSubject(_) => {
                "Invalid or expired token"
            }
        }
    }
}

/// Gate decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Continue(AuthenticatedUser),
    Reject(GateRejection),
}

/// Decide whether a request may proceed, based only on its headers.
///
/// Accepts exactly `Authorization: Bearer <token>`: case-sensitive scheme,
/// a single space and a non-empty token without whitespace.
pub fn inspect(headers: &HeaderMap, authenticator: &Authenticator) -> GateOutcome {
    let value = match headers.get(header::AUTHORIZATION) {
        Some(value) => value,
        None => return GateOutcome::Reject(GateRejection::MissingHeader),
    };

    let token = match bearer_token(value.to_str().ok()) {
        Some(token) => token,
        None => return GateOutcome::Reject(GateRejection::MalformedHeader),
    };

    let claims = match authenticator.validate_token(token) {
        Ok(claims) => claims,
        Err(e) => return GateOutcome::Reject(GateRejection::InvalidToken(e)),
    };

    match UserId::from_string(&claims.sub) {
        Ok(user_id) => GateOutcome::Continue(AuthenticatedUser {
            user_id,
            email: claims.email,
        }),
        Err(_) => GateOutcome::Reject(GateRejection::InvalidSubject(claims.sub)),
    }
}

fn bearer_token(value: Option<&str>) -> Option<&str> {
    let token = value?.strip_prefix(BEARER_PREFIX)?;
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Middleware guarding the protected routes.
///
/// On success the [`AuthenticatedUser`] is stored in the request extensions;
/// otherwise a 401 is returned and the inner service is never called.
pub async fn authenticate(
    State(authenticator): State<Arc<Authenticator>>,
    mut req: Request,
    next: Next,
) -> Response {
    match inspect(req.headers(), &authenticator) {
        GateOutcome::Continue(user) => {
            tracing::debug!(user_id = %user.user_id, "Request authenticated");
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        GateOutcome::Reject(rejection) => {
            tracing::warn!(
                reason = ?rejection,
                method = %req.method(),
                uri = %req.uri(),
                "Request rejected by auth gate"
            );
            ApiError::Unauthorized(rejection.public_message().to_string()).into_response()
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthenticatedUser>() {
            Some(user) => Ok(user.clone()),
            None => {
                tracing::error!(
                    uri = %parts.uri,
                    "AuthenticatedUser requested on a route without the auth gate"
                );
                debug_assert!(false, "route {} is not behind the auth gate", parts.uri);
                Err(ApiError::InternalServerError(
                    "Internal server error".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;

    use auth::HashingCost;
    use auth::PasswordHasher;
    use auth::TokenCodec;
    use axum::body::Body;
    use axum::http::HeaderValue;
    use axum::http::StatusCode;
    use axum::middleware;
    use axum::routing::get;
    use axum::Json;
    use axum::Router;
    use chrono::Duration;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde_json::json;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    const SECRET: &[u8] = b"test_secret_key_at_least_32_bytes!";

    fn authenticator() -> Arc<Authenticator> {
        let hasher = PasswordHasher::with_cost(HashingCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        Arc::new(Authenticator::new(
            hasher,
            TokenCodec::new(SECRET, Duration::hours(1)),
        ))
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn gated_router(authenticator: Arc<Authenticator>, invoked: Arc<AtomicBool>) -> Router {
        Router::new()
            .route(
                "/protected",
                get(move |identity: AuthenticatedUser| async move {
                    invoked.store(true, Ordering::SeqCst);
                    Json(json!({ "id": identity.user_id.0, "email": identity.email }))
                }),
            )
            .route_layer(middleware::from_fn_with_state(authenticator, authenticate))
    }

    async fn call(router: Router, authorization: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().uri("/protected");
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }
        let response = router
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_inspect_missing_header() {
        assert_eq!(
            inspect(&HeaderMap::new(), &authenticator()),
            GateOutcome::Reject(GateRejection::MissingHeader)
        );
    }

    #[test]
    fn test_inspect_malformed_headers() {
        let authenticator = authenticator();
        for value in ["Token abc", "bearer abc", "Bearer", "Bearer ", "Bearer  abc", "Bearer a b"] {
            assert_eq!(
                inspect(&headers_with(value), &authenticator),
                GateOutcome::Reject(GateRejection::MalformedHeader),
                "header {:?}",
                value
            );
        }
    }

    #[test]
    fn test_inspect_invalid_tokens() {
        let authenticator = authenticator();

        assert!(matches!(
            inspect(&headers_with("Bearer not-a-token"), &authenticator),
            GateOutcome::Reject(GateRejection::InvalidToken(JwtError::MalformedToken(_)))
        ));

        let foreign = TokenCodec::new(b"some_other_secret_of_sufficient_len", Duration::hours(1))
            .issue(42, "u42@example.com")
            .unwrap();
        assert_eq!(
            inspect(
                &headers_with(&format!("Bearer {}", foreign.access_token)),
                &authenticator
            ),
            GateOutcome::Reject(GateRejection::InvalidToken(JwtError::BadSignature))
        );

        let stale = TokenCodec::new(SECRET, Duration::hours(1))
            .issue_at(42, "u42@example.com", Utc::now() - Duration::hours(2))
            .unwrap();
        assert_eq!(
            inspect(
                &headers_with(&format!("Bearer {}", stale.access_token)),
                &authenticator
            ),
            GateOutcome::Reject(GateRejection::InvalidToken(JwtError::Expired))
        );
    }

    #[test]
    fn test_inspect_rejects_non_numeric_subject() {
        let authenticator = authenticator();
        let token = authenticator.issue_token("alice", "alice@example.com").unwrap();

        assert_eq!(
            inspect(
                &headers_with(&format!("Bearer {}", token.access_token)),
                &authenticator
            ),
            GateOutcome::Reject(GateRejection::InvalidSubject("alice".to_string()))
        );
    }

    #[test]
    fn test_inspect_valid_token() {
        let authenticator = authenticator();
        let token = authenticator.issue_token(42, "u42@example.com").unwrap();

        assert_eq!(
            inspect(
                &headers_with(&format!("Bearer {}", token.access_token)),
                &authenticator
            ),
            GateOutcome::Continue(AuthenticatedUser {
                user_id: UserId(42),
                email: "u42@example.com".to_string(),
            })
        );
    }

    #[test]
    fn test_public_messages_do_not_leak_kind() {
        assert_eq!(
            GateRejection::InvalidToken(JwtError::Expired).public_message(),
            GateRejection::InvalidToken(JwtError::BadSignature).public_message()
        );
        assert_eq!(
            GateRejection::InvalidSubject("x".into()).public_message(),
            "Invalid or expired token"
        );
    }

    #[tokio::test]
    async fn test_wrong_scheme_never_reaches_handler() {
        let invoked = Arc::new(AtomicBool::new(false));
        let router = gated_router(authenticator(), invoked.clone());

        let (status, body) = call(router, Some("Token abc")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["data"]["message"], "Malformed authorization header");
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_header_never_reaches_handler() {
        let invoked = Arc::new(AtomicBool::new(false));
        let router = gated_router(authenticator(), invoked.clone());

        let (status, body) = call(router, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status_code"], 401);
        assert_eq!(body["data"]["message"], "Authorization required");
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_valid_token_attaches_identity() {
        let authenticator = authenticator();
        let token = authenticator.issue_token(42, "u42@example.com").unwrap();
        let invoked = Arc::new(AtomicBool::new(false));
        let router = gated_router(authenticator, invoked.clone());

        let (status, body) = call(router, Some(&format!("Bearer {}", token.access_token))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "id": 42, "email": "u42@example.com" }));
        assert!(invoked.load(Ordering::SeqCst));
    }
}
