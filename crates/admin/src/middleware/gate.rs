//! Request-time perimeter gate.
//!
//! Runs before any protected handler: no identity plus a protected path
//! means a redirect to the auth entry point (or 401 for API calls) before
//! anything renders. This is deliberately coarse and side-effect-free;
//! slug and session-token validation happen after the shell loads, in the
//! session authority, so the gate can never become an oracle for slug
//! guessing.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tower_sessions::Session;

use crate::models::{CurrentIdentity, session_keys};

/// Paths reachable without an identity: the auth entry points, health
/// probes, static assets, the geolocation proxy, and telemetry ingest
/// (anonymous visitors are exactly who telemetry watches).
fn is_public(path: &str) -> bool {
    matches!(
        path,
        "/auth/login" | "/auth/logout" | "/auth/revalidate" | "/health" | "/health/ready"
            | "/api/geo" | "/api/telemetry"
    ) || path.starts_with("/static/")
}

/// The perimeter middleware.
pub async fn perimeter(session: Session, request: Request, next: Next) -> Response {
    let path = request.uri().path();

    if is_public(path) {
        return next.run(request).await;
    }

    let identity = session
        .get::<CurrentIdentity>(session_keys::CURRENT_IDENTITY)
        .await
        .ok()
        .flatten();

    if identity.is_none() {
        return if path.starts_with("/api/") {
            StatusCode::UNAUTHORIZED.into_response()
        } else {
            Redirect::to("/auth/login").into_response()
        };
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public("/auth/login"));
        assert!(is_public("/auth/revalidate"));
        assert!(is_public("/health"));
        assert!(is_public("/static/app.css"));
        assert!(is_public("/api/geo"));
        assert!(is_public("/api/telemetry"));
    }

    #[test]
    fn test_protected_paths() {
        assert!(!is_public("/"));
        assert!(!is_public("/vault/k3v9x2aq/dashboard"));
        assert!(!is_public("/api/security/events"));
        assert!(!is_public("/api/chat/rooms"));
        // Honeypot probes are protected too; an anonymous probe bounces to
        // the auth entry point like any other unauthenticated request.
        assert!(!is_public("/wp-admin"));
    }
}
