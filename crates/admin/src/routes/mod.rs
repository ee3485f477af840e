//! HTTP route handlers for the admin console.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                            - Liveness check
//! GET  /health/ready                      - Readiness check (store ping)
//!
//! # Auth (single authorized operator)
//! POST /auth/login                        - Credential check, mints {token, slug}
//! POST /auth/logout                       - Explicit sign-out
//! POST /auth/revalidate                   - ~30s single-device poll
//!
//! # Vault (slug-masked console shell)
//! GET  /vault/{slug}                      - Redirect to the dashboard page
//! GET  /vault/{slug}/{page}               - Shell descriptor / correction / denial
//!
//! # Telemetry
//! POST /api/telemetry                     - Client runtime event ingest
//! GET  /api/geo                           - Same-origin geolocation proxy
//!
//! # Security console
//! GET  /api/security/events               - Latest 100 audit events
//! POST /api/security/events/{id}/resolve  - Idempotent resolve
//! POST /api/security/blacklist            - Idempotent IP blacklist append
//! GET  /api/security/settings             - Settings row
//! PUT  /api/security/settings             - Replace settings row
//! POST /api/security/rotate-slug          - Force slug rotation
//! GET  /api/security/stream               - SSE audit/settings feed
//!
//! # Chat (E2EE)
//! GET  /api/chat/rooms                    - Room list
//! POST /api/chat/rooms                    - Open a room
//! GET  /api/chat/rooms/{id}/messages      - Decrypted history
//! POST /api/chat/rooms/{id}/messages      - Encrypt and store
//! GET  /api/chat/rooms/{id}/stream        - SSE room feed
//! ```

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub mod auth;
pub mod chat;
pub mod security;
pub mod telemetry;
pub mod vault;

/// Build the complete route tree (without middleware layers).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(auth::router())
        .merge(vault::router())
        .merge(telemetry::router())
        .merge(security::router())
        .merge(chat::router())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies store connectivity before returning OK.
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
