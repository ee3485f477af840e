//! Encrypted chat orchestration.
//!
//! Plaintext is encrypted before it reaches the store and decrypted on the
//! way out; a message that fails authentication renders as a placeholder
//! instead of failing the whole history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use ridgeline_core::{ChatRoomId, IdentityId, MessageId};

use crate::db::{Store, StoreError};
use crate::models::{ChatRoom, Message};
use crate::services::e2ee::{self, EncryptError, KeyDerivation};
use crate::services::realtime::{EventHub, Push};

/// What a message that fails decryption renders as.
pub const DECRYPT_PLACEHOLDER: &str = "[message cannot be decrypted]";

/// Errors from the chat service.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The room does not exist.
    #[error("room not found")]
    RoomNotFound,

    /// Encryption failed; the message was not stored.
    #[error(transparent)]
    Encrypt(#[from] EncryptError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A message as rendered to the operator: decrypted when possible,
/// placeholder otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct DecryptedMessage {
    /// Message ID.
    pub id: MessageId,
    /// Owning room.
    pub room_id: ChatRoomId,
    /// Sender identity.
    pub sender_id: IdentityId,
    /// Plaintext, or [`DECRYPT_PLACEHOLDER`].
    pub text: String,
    /// False when the placeholder is shown.
    pub decrypted: bool,
    /// When the message was stored.
    pub created_at: DateTime<Utc>,
}

/// The chat service.
pub struct ChatService {
    store: Arc<dyn Store>,
    keys: Arc<dyn KeyDerivation>,
    hub: EventHub,
}

impl ChatService {
    /// Create the service.
    pub fn new(store: Arc<dyn Store>, keys: Arc<dyn KeyDerivation>, hub: EventHub) -> Self {
        Self { store, keys, hub }
    }

    /// Create a room for a counterpart.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::Store`] if the insert fails.
    pub async fn create_room(&self, counterpart_id: IdentityId) -> Result<ChatRoom, ChatError> {
        let room = ChatRoom {
            id: ChatRoomId::generate(),
            counterpart_id,
            created_at: Utc::now(),
        };
        self.store.insert_room(&room).await?;
        Ok(room)
    }

    /// All rooms, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::Store`] if the read fails.
    pub async fn rooms(&self) -> Result<Vec<ChatRoom>, ChatError> {
        Ok(self.store.rooms().await?)
    }

    /// Encrypt and store one message, then publish it to the room stream.
    ///
    /// # Errors
    ///
    /// [`ChatError::RoomNotFound`] for an unknown room, or encryption and
    /// storage failures.
    pub async fn send(
        &self,
        room_id: ChatRoomId,
        sender_id: IdentityId,
        plaintext: &str,
    ) -> Result<Message, ChatError> {
        let room = self
            .store
            .room(room_id)
            .await?
            .ok_or(ChatError::RoomNotFound)?;

        let key = self.keys.derive_key(room.id);
        let ciphertext = e2ee::encrypt(plaintext, &key)?;

        let message = Message {
            id: MessageId::generate(),
            room_id: room.id,
            sender_id,
            ciphertext,
            created_at: Utc::now(),
        };
        self.store.insert_message(&message).await?;
        self.hub.publish(Push::MessageInserted {
            message: message.clone(),
        });

        Ok(message)
    }

    /// The decrypted history of a room, oldest first.
    ///
    /// A message that fails authentication renders as the placeholder; it
    /// never fails the surrounding history.
    ///
    /// # Errors
    ///
    /// [`ChatError::RoomNotFound`] for an unknown room, or a storage
    /// failure reading the history.
    pub async fn history(&self, room_id: ChatRoomId) -> Result<Vec<DecryptedMessage>, ChatError> {
        let room = self
            .store
            .room(room_id)
            .await?
            .ok_or(ChatError::RoomNotFound)?;
        let key = self.keys.derive_key(room.id);

        let messages = self.store.messages(room.id).await?;
        Ok(messages
            .into_iter()
            .map(|message| {
                let (text, decrypted) = match e2ee::decrypt(&message.ciphertext, &key) {
                    Ok(text) => (text, true),
                    Err(e) => {
                        tracing::debug!(message_id = %message.id, error = %e, "undecryptable message");
                        (DECRYPT_PLACEHOLDER.to_string(), false)
                    }
                };
                DecryptedMessage {
                    id: message.id,
                    room_id: message.room_id,
                    sender_id: message.sender_id,
                    text,
                    decrypted,
                    created_at: message.created_at,
                }
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::db::MemoryStore;
    use crate::services::e2ee::PassphraseDerivation;

    use super::*;

    fn service() -> (Arc<MemoryStore>, ChatService) {
        let store = Arc::new(MemoryStore::new());
        let service = ChatService::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(PassphraseDerivation),
            EventHub::new(),
        );
        (store, service)
    }

    #[tokio::test]
    async fn test_send_then_history_round_trips() {
        let (_, service) = service();
        let admin = IdentityId::generate();
        let room = service.create_room(IdentityId::generate()).await.unwrap();

        service.send(room.id, admin, "hello out there").await.unwrap();
        service.send(room.id, admin, "second message").await.unwrap();

        let history = service.history(room.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "hello out there");
        assert_eq!(history[1].text, "second message");
        assert!(history.iter().all(|m| m.decrypted));
    }

    #[tokio::test]
    async fn test_no_plaintext_reaches_the_store() {
        let (store, service) = service();
        let room = service.create_room(IdentityId::generate()).await.unwrap();

        service
            .send(room.id, IdentityId::generate(), "confidential text")
            .await
            .unwrap();

        let stored = store.messages(room.id).await.unwrap();
        assert!(!stored[0].ciphertext.contains("confidential"));
    }

    #[tokio::test]
    async fn test_foreign_ciphertext_renders_placeholder() {
        let (store, service) = service();
        let room_a = service.create_room(IdentityId::generate()).await.unwrap();
        let room_b = service.create_room(IdentityId::generate()).await.unwrap();

        // Encrypt under room A's key but file the row under room B.
        let key_a = PassphraseDerivation.derive_key(room_a.id);
        let foreign = Message {
            id: MessageId::generate(),
            room_id: room_b.id,
            sender_id: IdentityId::generate(),
            ciphertext: e2ee::encrypt("meant for room a", &key_a).unwrap(),
            created_at: Utc::now(),
        };
        store.insert_message(&foreign).await.unwrap();

        let history = service.history(room_b.id).await.unwrap();
        assert_eq!(history[0].text, DECRYPT_PLACEHOLDER);
        assert!(!history[0].decrypted);
    }

    #[tokio::test]
    async fn test_send_to_unknown_room_fails() {
        let (_, service) = service();
        let result = service
            .send(ChatRoomId::generate(), IdentityId::generate(), "hi")
            .await;
        assert!(matches!(result, Err(ChatError::RoomNotFound)));
    }

    #[tokio::test]
    async fn test_send_publishes_to_room_stream() {
        let (_, service) = service();
        let room = service.create_room(IdentityId::generate()).await.unwrap();
        let mut rx = service.hub.subscribe();

        service
            .send(room.id, IdentityId::generate(), "streamed")
            .await
            .unwrap();

        let push = rx.recv().await.unwrap();
        assert_eq!(push.room_id(), Some(room.id));
    }
}
