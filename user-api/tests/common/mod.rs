#![allow(dead_code)]

use std::sync::Arc;

use auth::Authenticator;
use auth::HashingCost;
use auth::PasswordHasher;
use auth::TokenCodec;
use chrono::Duration;
use serde_json::json;
use serde_json::Value;
use user_api::domain::credentials::service::CredentialService;
use user_api::domain::user::service::UserService;
use user_api::inbound::http::router::create_router;
use user_api::outbound::repositories::InMemoryUserRepository;

pub const JWT_SECRET: &[u8] = b"test-secret-key-for-jwt-signing-at-least-32-bytes";

/// Test application that spawns a real server over an in-memory store
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub api_client: reqwest::Client,
    pub token_codec: TokenCodec,
}

impl TestApp {
    /// Spawn the application with a one-hour token lifetime
    pub async fn spawn() -> Self {
        Self::spawn_with_ttl(Duration::hours(1)).await
    }

    /// Spawn the application in a background task and return TestApp
    pub async fn spawn_with_ttl(ttl: Duration) -> Self {
        // Use random port (0 = OS assigns)
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();
        let address = format!("http://127.0.0.1:{}", port);

        // Cheap hashing cost keeps the suite fast
        let password_hasher = PasswordHasher::with_cost(HashingCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .expect("Invalid hashing cost");

        let authenticator = Arc::new(Authenticator::new(
            password_hasher.clone(),
            TokenCodec::new(JWT_SECRET, ttl),
        ));

        let user_repository = Arc::new(InMemoryUserRepository::new());
        let credential_service = Arc::new(CredentialService::new(
            Arc::clone(&user_repository),
            Arc::clone(&authenticator),
        ));
        let user_service = Arc::new(UserService::new(user_repository, password_hasher));

        let router = create_router(credential_service, user_service, authenticator);

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server error");
        });

        Self {
            address,
            port,
            api_client: reqwest::Client::new(),
            token_codec: TokenCodec::new(JWT_SECRET, ttl),
        }
    }

    /// Helper to make GET request
    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.api_client.get(format!("{}{}", self.address, path))
    }

    /// Helper to make POST request
    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.api_client.post(format!("{}{}", self.address, path))
    }

    /// Helper to make GET request with Bearer token
    pub fn get_authenticated(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.get(path).bearer_auth(token)
    }

    /// Helper to make POST request with Bearer token
    pub fn post_authenticated(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.post(path).bearer_auth(token)
    }

    /// Helper to make PUT request with Bearer token
    pub fn put_authenticated(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.api_client
            .put(format!("{}{}", self.address, path))
            .bearer_auth(token)
    }

    /// Helper to make DELETE request with Bearer token
    pub fn delete_authenticated(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.api_client
            .delete(format!("{}{}", self.address, path))
            .bearer_auth(token)
    }

    /// Register an account and return the response body
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Value {
        let response = self
            .post("/api/v1/auth/register")
            .json(&json!({
                "email": email,
                "password": password,
                "name": name
            }))
            .send()
            .await
            .expect("Failed to execute request");

        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        response.json().await.expect("Failed to parse response")
    }

    /// Register an account and return its token
    pub async fn register_token(&self, email: &str) -> String {
        let body = self.register(email, "secret1", "Tester").await;
        body["data"]["token"]
            .as_str()
            .expect("Missing token")
            .to_string()
    }
}
