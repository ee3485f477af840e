//! Encrypted chat API.
//!
//! Messages are encrypted before storage and decrypted per-request; a row
//! that fails authentication renders as a placeholder in the history
//! rather than failing the view.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use ridgeline_core::{ChatRoomId, IdentityId};

use crate::error::AppError;
use crate::middleware::RequireIdentity;
use crate::models::{ChatRoom, Message};
use crate::services::chat::DecryptedMessage;
use crate::state::AppState;

/// Build the chat router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat/rooms", get(list_rooms).post(create_room))
        .route(
            "/api/chat/rooms/{id}/messages",
            get(history).post(send_message),
        )
        .route("/api/chat/rooms/{id}/stream", get(stream))
}

/// All rooms, newest first.
///
/// GET /api/chat/rooms
async fn list_rooms(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
) -> Result<Json<Vec<ChatRoom>>, AppError> {
    Ok(Json(state.chat().rooms().await?))
}

#[derive(Debug, Deserialize)]
struct CreateRoomRequest {
    counterpart_id: Uuid,
}

/// Open a room with an external counterpart.
///
/// POST /api/chat/rooms
async fn create_room(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<ChatRoom>), AppError> {
    let room = state
        .chat()
        .create_room(IdentityId::new(request.counterpart_id))
        .await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// Decrypted room history, oldest first.
///
/// GET /api/chat/rooms/{id}/messages
async fn history(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DecryptedMessage>>, AppError> {
    let messages = state.chat().history(ChatRoomId::new(id)).await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    text: String,
}

/// Encrypt and store one message.
///
/// POST /api/chat/rooms/{id}/messages
async fn send_message(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    Path(id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    if request.text.is_empty() {
        return Err(AppError::BadRequest("text must not be empty".to_string()));
    }

    let message = state
        .chat()
        .send(ChatRoomId::new(id), identity.id, &request.text)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// SSE feed of message inserts for one room.
///
/// GET /api/chat/rooms/{id}/stream
///
/// At-least-once delivery; consumers tolerate duplicates after reconnect.
async fn stream(
    State(state): State<AppState>,
    RequireIdentity(_identity): RequireIdentity,
    Path(id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let room_id = ChatRoomId::new(id);
    let mut rx = state.hub().subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(push) if push.room_id() == Some(room_id) => {
                    let json = serde_json::to_string(&push)
                        .unwrap_or_else(|_| "{}".to_string());
                    yield Ok(Event::default().data(json));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "room stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
