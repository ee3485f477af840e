//! Authentication route handlers.
//!
//! JSON API consumed by the console shell: login mints the
//! `{token, slug}` pair, revalidate is the ~30s single-device poll, and
//! logout ends the session explicitly.

use axum::extract::State;
use axum::http::header::{SET_COOKIE, USER_AGENT};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use ridgeline_core::{RoutingSlug, SessionToken};

use crate::error::AppError;
use crate::middleware::{clear_current_identity, set_current_identity};
use crate::models::{AuthState, CurrentIdentity};
use crate::services::session_authority::{Revalidation, SessionAuthority};
use crate::state::AppState;

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/revalidate", post(revalidate))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: SessionToken,
    slug: RoutingSlug,
    redirect: String,
}

/// Authenticate and mint a fresh session.
///
/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let user_agent = user_agent(&headers);

    let outcome = state
        .authority()
        .login(&request.email, &request.password, user_agent)
        .await?;

    let identity = CurrentIdentity {
        id: outcome.identity_id,
        email: state.authority().admin_email().clone(),
    };
    set_current_identity(&session, &identity)
        .await
        .map_err(|e| AppError::Internal(format!("session write: {e}")))?;

    let cookie = state.authority().slug_cookie(&outcome.slug);
    let redirect = format!("/vault/{}/dashboard", outcome.slug);

    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginResponse {
            token: outcome.token,
            slug: outcome.slug,
            redirect,
        }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct LogoutRequest {
    token: Option<String>,
}

/// Explicit sign-out: deactivate the device session, drop the HTTP
/// session, and clear the slug cookie.
///
/// POST /auth/logout
async fn logout(
    State(state): State<AppState>,
    session: Session,
    body: Option<Json<LogoutRequest>>,
) -> Result<Response, AppError> {
    if let Some(Json(LogoutRequest { token: Some(token) })) = body {
        state.authority().sign_out(&SessionToken::new(token)).await?;
    }
    let _ = clear_current_identity(&session).await;

    Ok((
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, SessionAuthority::clear_slug_cookie())],
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct RevalidateRequest {
    token: String,
    /// The path the context is currently on, for slug correction.
    path: Option<String>,
}

#[derive(Debug, Serialize)]
struct RevalidateResponse {
    /// `valid`, `invalidated`, or `unauthenticated`.
    status: &'static str,
    /// The context's next authentication state.
    #[serde(flatten)]
    state: AuthState,
    /// Where the context should navigate, if anywhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<String>,
}

/// The recurring single-device check.
///
/// POST /auth/revalidate
///
/// A token that no longer matches the most recent active session is a
/// takeover signal, not an error: the context is silently evicted and
/// redirected to authentication.
async fn revalidate(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RevalidateRequest>,
) -> Result<Response, AppError> {
    let token = SessionToken::new(request.token);

    match state.authority().revalidate(&token).await? {
        Revalidation::Valid { slug: Some(slug) } => {
            let redirect = request
                .path
                .as_deref()
                .and_then(|path| corrected_path(path, &slug));
            // Re-sync the slug cookie with the authoritative binding.
            let cookie = state.authority().slug_cookie(&slug);
            Ok((
                [(SET_COOKIE, cookie)],
                Json(RevalidateResponse {
                    status: "valid",
                    state: AuthState::authenticated(slug),
                    redirect,
                }),
            )
                .into_response())
        }
        Revalidation::Valid { slug: None } | Revalidation::Unauthenticated => {
            Ok(Json(RevalidateResponse {
                status: "unauthenticated",
                state: AuthState::Unauthenticated,
                redirect: Some("/auth/login".to_string()),
            })
            .into_response())
        }
        Revalidation::Invalidated => {
            let _ = clear_current_identity(&session).await;
            Ok((
                [(SET_COOKIE, SessionAuthority::clear_slug_cookie())],
                Json(RevalidateResponse {
                    status: "invalidated",
                    state: AuthState::Unauthenticated,
                    redirect: Some("/auth/login".to_string()),
                }),
            )
                .into_response())
        }
    }
}

/// Where a context on `path` should navigate given the current slug.
///
/// Public pages redirect into the vault; a vault path with a stale slug
/// redirects to the corrected path; a matching path yields `None`.
fn corrected_path(path: &str, slug: &RoutingSlug) -> Option<String> {
    if path == "/" || path.starts_with("/auth") {
        return Some(format!("/vault/{slug}/dashboard"));
    }

    let rest = path.strip_prefix("/vault/")?;
    let (path_slug, page) = rest.split_once('/').unwrap_or((rest, "dashboard"));
    if path_slug == slug.as_str() {
        None
    } else {
        Some(format!("/vault/{slug}/{page}"))
    }
}

fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn slug() -> RoutingSlug {
        RoutingSlug::parse("k3v9x2aq").unwrap()
    }

    #[test]
    fn test_corrected_path_from_public_pages() {
        assert_eq!(
            corrected_path("/", &slug()).as_deref(),
            Some("/vault/k3v9x2aq/dashboard")
        );
        assert_eq!(
            corrected_path("/auth/login", &slug()).as_deref(),
            Some("/vault/k3v9x2aq/dashboard")
        );
    }

    #[test]
    fn test_corrected_path_for_stale_slug() {
        assert_eq!(
            corrected_path("/vault/stalestal/security", &slug()).as_deref(),
            Some("/vault/k3v9x2aq/security")
        );
    }

    #[test]
    fn test_matching_path_needs_no_correction() {
        assert_eq!(corrected_path("/vault/k3v9x2aq/security", &slug()), None);
    }

    #[test]
    fn test_non_vault_path_is_left_alone() {
        assert_eq!(corrected_path("/api/chat/rooms", &slug()), None);
    }
}
