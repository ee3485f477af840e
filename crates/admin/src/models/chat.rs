//! Encrypted chat domain models.
//!
//! Messages persist ciphertext only; plaintext exists in memory for the
//! duration of a request and nowhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ridgeline_core::{ChatRoomId, IdentityId, MessageId};

/// A conversation between the admin and one external counterpart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    /// Unique room ID. Also the input to key derivation.
    pub id: ChatRoomId,
    /// The external counterpart's identity.
    pub counterpart_id: IdentityId,
    /// When the room was created.
    pub created_at: DateTime<Utc>,
}

/// One encrypted message, owned by exactly one room.
///
/// `ciphertext` is `base64(nonce ‖ payload)`; it is meaningless without a
/// key re-derived from the room ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID.
    pub id: MessageId,
    /// Room this message belongs to.
    pub room_id: ChatRoomId,
    /// Who sent it.
    pub sender_id: IdentityId,
    /// Encrypted payload, nonce-prefixed and base64-encoded.
    pub ciphertext: String,
    /// When the message was stored.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serde_keeps_ciphertext_opaque() {
        let message = Message {
            id: MessageId::generate(),
            room_id: ChatRoomId::generate(),
            sender_id: IdentityId::generate(),
            ciphertext: "AAECAwQFBgcICQoL".to_string(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("AAECAwQFBgcICQoL"));
    }
}
