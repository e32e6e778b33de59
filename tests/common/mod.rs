#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use chrono::Utc;
use tower::ServiceExt;

use user_gateway::app::build_router;
use user_gateway::config::{AppEnv, BreakerSettings, Config, OidcSettings};
use user_gateway::services::auth::oidc::ProviderMetadata;
use user_gateway::services::auth::{AccessTokenVerifier, OidcClient, Session};
use user_gateway::services::cache::MemoryClient;
use user_gateway::state::AppState;

pub const PUBLIC_BASE_URL: &str = "http://gateway.test";
pub const SPA_ORIGIN: &str = "https://spa.example";
pub const AUDIENCE: &str = "https://api.bookesy.example";
pub const BACKEND_TIMEOUT: Duration = Duration::from_millis(300);
pub const ISSUER: &str = "https://idp.example.com";

// Test-only RSA key pair; the public half verifies bearer tokens.
pub const TEST_PRIVATE_KEY_PEM: &str = include_str!("../fixtures/rsa_private.pem");
pub const TEST_PUBLIC_KEY_PEM: &str = include_str!("../fixtures/rsa_public.pem");

pub const USER_JSON: &str = r#"{"id":42,"auth0UserId":"auth0|42","email":"a@b.com","name":"Ada","surname":"Lovelace","bio":null,"creationDate":1714557600000,"role":"USER"}"#;

/// Counts requests that reached the mock backend.
#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Serve `router` on an ephemeral local port; returns its base URL.
pub async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A base URL nothing listens on.
pub async fn unreachable_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn test_config(backend_url: &str) -> Config {
    Config {
        addr: "127.0.0.1:0".parse().unwrap(),
        app_env: AppEnv::Development,
        public_base_url: PUBLIC_BASE_URL.to_string(),
        oidc: OidcSettings {
            issuer: ISSUER.into(),
            registration_id: "okta".into(),
            client_id: "gateway-client".into(),
            client_secret: "gateway-secret".into(),
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
            audience: AUDIENCE.into(),
        },
        access_jwt_public_key_pem: None,
        cors_allowed_origins: vec![SPA_ORIGIN.to_string()],
        csrf_enabled: true,
        session_ttl_seconds: 1800,
        valkey_url: None,
        user_service_url: backend_url.to_string(),
        backend_timeout: BACKEND_TIMEOUT,
        breaker: BreakerSettings::default(),
    }
}

pub fn provider_metadata() -> ProviderMetadata {
    ProviderMetadata {
        issuer: "https://idp.example.com".into(),
        authorization_endpoint: "https://idp.example.com/authorize".into(),
        token_endpoint: "https://idp.example.com/oauth/token".into(),
        jwks_uri: "https://idp.example.com/.well-known/jwks.json".into(),
        end_session_endpoint: Some("https://idp.example.com/v2/logout".into()),
    }
}

pub struct TestGateway {
    pub router: Router,
    pub state: AppState,
}

impl TestGateway {
    pub fn new(config: Config) -> Self {
        let access_verifier = config.access_jwt_public_key_pem.as_deref().map(|pem| {
            Arc::new(
                AccessTokenVerifier::new(pem, &config.oidc.issuer, &config.oidc.audience, 60)
                    .unwrap(),
            )
        });
        let oidc = Arc::new(OidcClient::new(
            config.oidc.clone(),
            provider_metadata(),
            reqwest::Client::new(),
        ));
        let state = AppState::new(
            &config,
            oidc,
            Arc::new(MemoryClient::new()),
            access_verifier,
        )
        .unwrap();
        let router = build_router(state.clone());
        Self { router, state }
    }

    pub fn for_backend(backend_url: &str) -> Self {
        Self::new(test_config(backend_url))
    }

    /// Store a logged-in session and return its id (the `SESSION` cookie value).
    pub async fn login(&self) -> String {
        let session = Session {
            subject: "auth0|42".into(),
            email: Some("a@b.com".into()),
            name: Some("Ada".into()),
            id_token: Some("header.payload.signature".into()),
            created_at: Utc::now(),
        };
        self.state.sessions.create(&session).await.unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all("set-cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }
}

pub fn session_cookie(session_id: &str) -> String {
    format!("SESSION={}", session_id)
}

pub fn create_user_request() -> Request<Body> {
    Request::post("/users")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"auth0UserId":"auth0|42","email":"a@b.com","name":"Ada","surname":"Lovelace","bio":null}"#,
        ))
        .unwrap()
}
