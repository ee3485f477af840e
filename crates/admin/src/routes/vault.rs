//! Slug-masked vault routing.
//!
//! Every console page lives under `/vault/{slug}/{page}`. A stale slug is
//! an auto-corrected redirect, never an error; a slug with no binding at
//! all is the explicit access-denied state, because there is no safe
//! correction target.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use ridgeline_core::RoutingSlug;

use crate::error::AppError;
use crate::middleware::RequireIdentity;
use crate::models::AuthState;
use crate::services::session_authority::SlugCheck;
use crate::state::AppState;

/// Build the vault router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/vault/{slug}", get(shell_root))
        .route("/vault/{slug}/{page}", get(shell))
}

/// What the console shell boots from.
#[derive(Debug, Serialize)]
struct ShellDescriptor {
    #[serde(flatten)]
    state: AuthState,
    page: String,
}

/// Serve the shell descriptor for a vault page.
///
/// GET /vault/{slug}/{page}
async fn shell(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
    Path((slug, page)): Path<(String, String)>,
) -> Result<Response, AppError> {
    match state.authority().check_slug(&slug, &page).await? {
        SlugCheck::Match => {
            let slug = RoutingSlug::parse(&slug)
                .map_err(|e| AppError::BadRequest(format!("slug: {e}")))?;
            Ok(Json(ShellDescriptor {
                state: AuthState::authenticated(slug),
                page,
            })
            .into_response())
        }
        SlugCheck::Corrected { location } => Ok(Redirect::temporary(&location).into_response()),
        SlugCheck::Denied => Err(AppError::Forbidden(
            "no active session binding for this path".to_string(),
        )),
    }
}

/// A bare slug navigates to its dashboard.
///
/// GET /vault/{slug}
async fn shell_root(Path(slug): Path<String>) -> Redirect {
    Redirect::temporary(&format!("/vault/{slug}/dashboard"))
}
