//! Telemetry ingest and the same-origin geolocation proxy.

use axum::extract::State;
use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::middleware::OptionalIdentity;
use crate::services::geo::GeoInfo;
use crate::services::telemetry::ClientEvent;
use crate::state::AppState;

/// Build the telemetry router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/telemetry", post(ingest))
        .route("/api/geo", get(geo_proxy))
}

#[derive(Debug, Deserialize)]
struct TelemetryRequest {
    /// Opaque client-context identifier (one per tab).
    context: String,
    #[serde(flatten)]
    event: ClientEvent,
}

/// Ingest one client runtime event.
///
/// POST /api/telemetry
///
/// Always responds 202: the collector swallows its own failures so the
/// client runtime never sees telemetry errors.
async fn ingest(
    State(state): State<AppState>,
    OptionalIdentity(identity): OptionalIdentity,
    headers: HeaderMap,
    Json(request): Json<TelemetryRequest>,
) -> StatusCode {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    let collector = state.collectors().collector(&request.context);
    collector
        .observe(identity.map(|i| i.id), user_agent, request.event)
        .await;

    StatusCode::ACCEPTED
}

/// Same-origin geolocation proxy.
///
/// GET /api/geo
///
/// Keeps the upstream lookup off the client origin; always answers 200,
/// with the sentinel on upstream failure.
async fn geo_proxy(State(state): State<AppState>) -> Json<GeoInfo> {
    Json(state.geo().lookup().await)
}
