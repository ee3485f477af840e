//! Security console API.
//!
//! Reads and resolves audit events, manages the settings row, and exposes
//! the live SSE feed. Resolving an event and blacklisting its IP are two
//! independent, idempotent actions, never a transaction.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use ridgeline_core::{AuditEventId, RoutingSlug};

use crate::error::AppError;
use crate::middleware::RequireIdentity;
use crate::models::{AuditEvent, SiteSettings};
use crate::services::realtime::Push;
use crate::state::AppState;

/// How many events the feed serves.
const FEED_LIMIT: u32 = 100;

/// Build the security console router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/security/events", get(list_events))
        .route("/api/security/events/{id}/resolve", post(resolve_event))
        .route("/api/security/blacklist", post(blacklist_ip))
        .route("/api/security/settings", get(get_settings).put(put_settings))
        .route("/api/security/rotate-slug", post(rotate_slug))
        .route("/api/security/stream", get(stream))
}

/// The latest audit events, newest first.
///
/// GET /api/security/events
async fn list_events(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
) -> Result<Json<Vec<AuditEvent>>, AppError> {
    let events = state.store().recent_audit(FEED_LIMIT).await?;
    Ok(Json(events))
}

/// Mark an event resolved. Idempotent.
///
/// POST /api/security/events/{id}/resolve
async fn resolve_event(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let id = AuditEventId::new(id);
    state.store().resolve_audit(id).await?;
    state.hub().publish(Push::AuditResolved { id });
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct BlacklistRequest {
    ip: String,
}

/// Append an IP to the blacklist. Idempotent, independent of resolve.
///
/// POST /api/security/blacklist
async fn blacklist_ip(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
    Json(request): Json<BlacklistRequest>,
) -> Result<StatusCode, AppError> {
    let ip = request.ip.trim();
    if ip.is_empty() {
        return Err(AppError::BadRequest("ip must not be empty".to_string()));
    }

    state.store().append_blacklisted_ip(ip).await?;
    state.hub().publish(Push::SettingsUpdated);
    Ok(StatusCode::NO_CONTENT)
}

/// The settings row.
///
/// GET /api/security/settings
async fn get_settings(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
) -> Result<Json<SiteSettings>, AppError> {
    Ok(Json(state.store().site_settings().await?))
}

/// Replace the settings row.
///
/// PUT /api/security/settings
async fn put_settings(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
    Json(settings): Json<SiteSettings>,
) -> Result<StatusCode, AppError> {
    state.store().update_site_settings(&settings).await?;
    state.hub().publish(Push::SettingsUpdated);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct RotateResponse {
    slug: RoutingSlug,
}

/// Force-rotate the routing slug. Every open context self-corrects on its
/// next revalidation poll.
///
/// POST /api/security/rotate-slug
async fn rotate_slug(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
) -> Result<Json<RotateResponse>, AppError> {
    let slug = state.authority().rotate_slug().await?;
    Ok(Json(RotateResponse { slug }))
}

/// Live SSE feed of audit inserts, resolutions, and settings changes.
///
/// GET /api/security/stream
///
/// Delivery is at-least-once; a lagged subscriber skips the oldest pushes
/// and keeps going.
async fn stream(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.hub().subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(push) if push.is_security() => {
                    let json = serde_json::to_string(&push)
                        .unwrap_or_else(|_| "{}".to_string());
                    yield Ok(Event::default().data(json));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "security stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
