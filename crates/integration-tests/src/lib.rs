//! Integration test harness for the Ridgeline admin console.
//!
//! Drives the real router (routes + perimeter gate + session layer) over
//! `tower::ServiceExt::oneshot` against the in-memory store, with a stub
//! geolocation source. No network, no database.
//!
//! # Test Categories
//!
//! - `session_integrity` - single-active-session and takeover semantics
//! - `vault_routing` - slug correction, access denial, the perimeter gate
//! - `telemetry_pipeline` - dedup, rate window, honeypot, geolocation
//! - `chat_messaging` - E2EE round trips and placeholder rendering
//! - `security_console` - resolve/blacklist idempotency, settings, rotation

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use argon2::Argon2;
use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE, USER_AGENT};
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use secrecy::SecretString;
use tower::ServiceExt;

use ridgeline_admin::config::{AdminAccountConfig, AdminConfig, GeoConfig};
use ridgeline_admin::db::{MemoryStore, Store};
use ridgeline_admin::middleware::{create_memory_session_layer, perimeter};
use ridgeline_admin::routes;
use ridgeline_admin::services::geo::{GeoInfo, GeoLookup};
use ridgeline_admin::state::AppState;
use ridgeline_core::Email;

/// The single authorized operator address used across the tests.
pub const ADMIN_EMAIL: &str = "ops@ridgeline-hq.dev";

/// The operator password used across the tests.
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";

/// Geolocation stub: a fixed answer after an optional delay, the way the
/// real client absorbs its timeout into the sentinel.
pub struct StubGeo {
    /// The answer every lookup returns.
    pub info: GeoInfo,
    /// Artificial resolution delay.
    pub delay: Duration,
}

impl StubGeo {
    /// A stub resolving instantly to a fixed location.
    #[must_use]
    pub fn resolved() -> Self {
        Self {
            info: GeoInfo {
                ip: "198.51.100.7".to_string(),
                country: "Norway".to_string(),
            },
            delay: Duration::ZERO,
        }
    }

    /// A stub that simulates a timed-out upstream: slow, then sentinel.
    #[must_use]
    pub fn timed_out() -> Self {
        Self {
            info: GeoInfo::unknown(),
            delay: Duration::from_millis(100),
        }
    }
}

#[async_trait]
impl GeoLookup for StubGeo {
    async fn lookup(&self) -> GeoInfo {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.info.clone()
    }
}

/// A logged-in device context: its cookies plus the minted pair.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// `Cookie` header value replaying this context's cookies.
    pub cookie_header: String,
    /// The device session token.
    pub token: String,
    /// The minted routing slug.
    pub slug: String,
}

/// A collected response: status, headers, body bytes.
#[derive(Debug)]
pub struct TestResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    /// Parse the body as JSON.
    ///
    /// # Panics
    ///
    /// Panics if the body is not valid JSON.
    #[must_use]
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    /// All `Set-Cookie` values on the response.
    #[must_use]
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(ToString::to_string)
            .collect()
    }

    /// The `Location` header, if any.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers.get("location").and_then(|v| v.to_str().ok())
    }
}

/// The assembled application under test.
pub struct TestContext {
    router: Router,
    /// The in-memory store, for direct assertions.
    pub store: Arc<MemoryStore>,
    /// The application state, for service-level access.
    pub state: AppState,
}

impl TestContext {
    /// Build the app with an instantly-resolving geolocation stub.
    ///
    /// # Panics
    ///
    /// Panics if state construction fails.
    pub async fn new() -> Self {
        Self::with_geo(Arc::new(StubGeo::resolved())).await
    }

    /// Build the app with a custom geolocation source.
    ///
    /// # Panics
    ///
    /// Panics if state construction fails.
    pub async fn with_geo(geo: Arc<dyn GeoLookup>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::with_geo(test_config(), Arc::clone(&store) as Arc<dyn Store>, geo)
            .expect("state construction");

        state
            .authority()
            .ensure_profile("Ridgeline Ops")
            .await
            .expect("profile bootstrap");

        let router = routes::routes()
            .layer(axum::middleware::from_fn(perimeter))
            .layer(create_memory_session_layer())
            .with_state(state.clone());

        Self {
            router,
            store,
            state,
        }
    }

    /// Send one request through the app.
    ///
    /// # Panics
    ///
    /// Panics if the router rejects the request at the transport level.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .expect("body collects")
            .to_bytes()
            .to_vec();

        TestResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    /// Log in as the operator and capture the device context.
    ///
    /// # Panics
    ///
    /// Panics if login does not succeed.
    pub async fn login(&self) -> AuthSession {
        let response = self
            .send(post_json(
                "/auth/login",
                &serde_json::json!({
                    "email": ADMIN_EMAIL,
                    "password": ADMIN_PASSWORD,
                }),
                None,
            ))
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed");

        let cookie_header = cookie_header(&response.set_cookies());
        let body = response.json();

        AuthSession {
            cookie_header,
            token: body["token"].as_str().expect("token").to_string(),
            slug: body["slug"].as_str().expect("slug").to_string(),
        }
    }
}

/// Build a GET request, optionally replaying a context's cookies.
#[must_use]
pub fn get(uri: &str, session: Option<&AuthSession>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .header(USER_AGENT, "integration-tests");
    if let Some(session) = session {
        builder = builder.header(COOKIE, &session.cookie_header);
    }
    builder.body(Body::empty()).expect("request builds")
}

/// Build a JSON request with the given method.
#[must_use]
pub fn json_request(
    method: &str,
    uri: &str,
    body: &serde_json::Value,
    session: Option<&AuthSession>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_AGENT, "integration-tests")
        .header(CONTENT_TYPE, "application/json");
    if let Some(session) = session {
        builder = builder.header(COOKIE, &session.cookie_header);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

/// Build a POST request carrying JSON.
#[must_use]
pub fn post_json(
    uri: &str,
    body: &serde_json::Value,
    session: Option<&AuthSession>,
) -> Request<Body> {
    json_request("POST", uri, body, session)
}

/// Collapse `Set-Cookie` values into a `Cookie` header.
#[must_use]
pub fn cookie_header(set_cookies: &[String]) -> String {
    set_cookies
        .iter()
        .filter_map(|cookie| cookie.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

fn test_config() -> AdminConfig {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(ADMIN_PASSWORD.as_bytes(), &salt)
        .expect("hashing succeeds")
        .to_string();

    AdminConfig {
        database_url: SecretString::from("postgres://unused/in-memory"),
        host: "127.0.0.1".parse::<IpAddr>().expect("valid host"),
        port: 0,
        base_url: "http://localhost:3001".to_string(),
        session_secret: SecretString::from("kJ8#mQ2$vX9!pL4@wN7^rT3&bZ6*cF1%"),
        admin: AdminAccountConfig {
            email: Email::parse(ADMIN_EMAIL).expect("valid email"),
            password_hash: SecretString::from(password_hash),
            full_name: "Ridgeline Ops".to_string(),
        },
        geo: GeoConfig {
            endpoint: "http://127.0.0.1:1/unused".to_string(),
            timeout: Duration::from_secs(2),
        },
        email: None,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 1.0,
        tls: None,
    }
}
