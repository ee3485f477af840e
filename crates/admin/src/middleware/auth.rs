//! Authentication extractors for route handlers.
//!
//! The HTTP session carries a cached [`CurrentIdentity`]; these extractors
//! read it. Fine-grained slug/session validation stays with the session
//! authority, these only answer "is someone signed in here".

use axum::extract::FromRequestParts;
use axum::http::{StatusCode, request::Parts};
use axum::response::{IntoResponse, Redirect, Response};
use tower_sessions::Session;

use crate::models::{CurrentIdentity, session_keys};

/// Extractor that requires a signed-in identity.
///
/// Rejects with a redirect to the auth entry point for page requests, or
/// 401 for API requests.
pub struct RequireIdentity(pub CurrentIdentity);

/// Error returned when authentication is required but absent.
pub enum IdentityRejection {
    /// Redirect to the auth entry point (page requests).
    RedirectToLogin,
    /// Unauthorized response (API requests).
    Unauthorized,
}

impl IntoResponse for IdentityRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/auth/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireIdentity
where
    S: Send + Sync,
{
    type Rejection = IdentityRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(IdentityRejection::Unauthorized)?;

        let identity: CurrentIdentity = session
            .get(session_keys::CURRENT_IDENTITY)
            .await
            .ok()
            .flatten()
            .ok_or_else(|| {
                if parts.uri.path().starts_with("/api/") {
                    IdentityRejection::Unauthorized
                } else {
                    IdentityRejection::RedirectToLogin
                }
            })?;

        Ok(Self(identity))
    }
}

/// Extractor that optionally gets the current identity.
///
/// Never rejects; anonymous callers yield `None`.
pub struct OptionalIdentity(pub Option<CurrentIdentity>);

impl<S> FromRequestParts<S> for OptionalIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CurrentIdentity>(session_keys::CURRENT_IDENTITY)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(identity))
    }
}

/// Store the current identity in the HTTP session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_identity(
    session: &Session,
    identity: &CurrentIdentity,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(session_keys::CURRENT_IDENTITY, identity)
        .await
}

/// Clear the current identity (sign-out or takeover eviction).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_identity(
    session: &Session,
) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
