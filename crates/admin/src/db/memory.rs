//! In-memory store for tests and local development.
//!
//! Mirrors [`PgStore`](super::PgStore) semantics exactly: overwrite-style
//! writes, append-only audit, idempotent resolve/blacklist. Sessions keep
//! insertion order so "most recently created" is deterministic even when
//! two logins land in the same millisecond.

use std::sync::RwLock;

use async_trait::async_trait;

use ridgeline_core::{AuditEventId, ChatRoomId, IdentityId, RoutingSlug, SessionToken};

use crate::models::{
    AuditEvent, ChatRoom, LoginSession, Message, Profile, ResolutionStatus, SiteSettings,
};

use super::{Store, StoreError};

#[derive(Default)]
struct Inner {
    profile: Option<Profile>,
    sessions: Vec<LoginSession>,
    audit: Vec<AuditEvent>,
    settings: Option<SiteSettings>,
    rooms: Vec<ChatRoom>,
    messages: Vec<Message>,
}

/// An in-memory [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Lock poisoning only happens if another thread panicked while
    // holding the guard; tests want that panic propagated.
    #[allow(clippy::unwrap_used)]
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap()
    }

    #[allow(clippy::unwrap_used)]
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn profile(&self) -> Result<Option<Profile>, StoreError> {
        Ok(self.read().profile.clone())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        self.write().profile = Some(profile.clone());
        Ok(())
    }

    async fn set_profile_slug(
        &self,
        identity_id: IdentityId,
        slug: &RoutingSlug,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        match inner.profile.as_mut() {
            Some(profile) if profile.id == identity_id => {
                profile.current_session_slug = Some(slug.clone());
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn deactivate_sessions(&self, identity_id: IdentityId) -> Result<(), StoreError> {
        for session in &mut self.write().sessions {
            if session.identity_id == identity_id {
                session.active = false;
            }
        }
        Ok(())
    }

    async fn insert_session(&self, session: &LoginSession) -> Result<(), StoreError> {
        self.write().sessions.push(session.clone());
        Ok(())
    }

    async fn latest_active_session(
        &self,
        identity_id: IdentityId,
    ) -> Result<Option<LoginSession>, StoreError> {
        Ok(self
            .read()
            .sessions
            .iter()
            .rev()
            .find(|s| s.identity_id == identity_id && s.active)
            .cloned())
    }

    async fn active_session_count(&self, identity_id: IdentityId) -> Result<u64, StoreError> {
        Ok(self
            .read()
            .sessions
            .iter()
            .filter(|s| s.identity_id == identity_id && s.active)
            .count() as u64)
    }

    async fn deactivate_token(&self, token: &SessionToken) -> Result<(), StoreError> {
        for session in &mut self.write().sessions {
            if session.token == *token {
                session.active = false;
            }
        }
        Ok(())
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.write().audit.push(event.clone());
        Ok(())
    }

    async fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self
            .read()
            .audit
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn audit_event(&self, id: AuditEventId) -> Result<Option<AuditEvent>, StoreError> {
        Ok(self.read().audit.iter().find(|e| e.id == id).cloned())
    }

    async fn resolve_audit(&self, id: AuditEventId) -> Result<(), StoreError> {
        let mut inner = self.write();
        let event = inner
            .audit
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound)?;
        event.resolution_status = ResolutionStatus::Resolved;
        Ok(())
    }

    async fn site_settings(&self) -> Result<SiteSettings, StoreError> {
        Ok(self.read().settings.clone().unwrap_or_default())
    }

    async fn update_site_settings(&self, settings: &SiteSettings) -> Result<(), StoreError> {
        self.write().settings = Some(settings.clone());
        Ok(())
    }

    async fn append_blacklisted_ip(&self, ip: &str) -> Result<(), StoreError> {
        let mut inner = self.write();
        let settings = inner.settings.get_or_insert_with(SiteSettings::default);
        if !settings.blacklisted_ips.iter().any(|known| known == ip) {
            settings.blacklisted_ips.push(ip.to_owned());
        }
        Ok(())
    }

    async fn insert_room(&self, room: &ChatRoom) -> Result<(), StoreError> {
        self.write().rooms.push(room.clone());
        Ok(())
    }

    async fn rooms(&self) -> Result<Vec<ChatRoom>, StoreError> {
        Ok(self.read().rooms.iter().rev().cloned().collect())
    }

    async fn room(&self, id: ChatRoomId) -> Result<Option<ChatRoom>, StoreError> {
        Ok(self.read().rooms.iter().find(|r| r.id == id).cloned())
    }

    async fn insert_message(&self, message: &Message) -> Result<(), StoreError> {
        self.write().messages.push(message.clone());
        Ok(())
    }

    async fn messages(&self, room_id: ChatRoomId) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .read()
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use ridgeline_core::Email;
    use serde_json::json;

    use crate::models::{AuditEventType, NewAuditEvent};

    use super::*;

    fn profile() -> Profile {
        Profile {
            id: IdentityId::generate(),
            email: Email::parse("ops@ridgeline-hq.dev").unwrap(),
            full_name: "Ridgeline Ops".to_string(),
            current_session_slug: None,
            created_at: Utc::now(),
        }
    }

    fn session(identity_id: IdentityId, token: &str) -> LoginSession {
        LoginSession {
            token: SessionToken::from(token),
            identity_id,
            user_agent: "test".to_string(),
            active: true,
            created_at: Utc::now(),
        }
    }

    fn audit_event() -> AuditEvent {
        NewAuditEvent {
            subdomain: "admin".to_string(),
            event_type: AuditEventType::PageView,
            identity_id: None,
            ip_address: "0.0.0.0".to_string(),
            user_agent: "test".to_string(),
            country: "Unknown".to_string(),
            metadata: json!({"path": "/"}),
        }
        .into_event()
    }

    #[tokio::test]
    async fn test_deactivate_then_insert_keeps_one_active() {
        let store = MemoryStore::new();
        let identity = IdentityId::generate();

        for token in ["first", "second", "third"] {
            store.deactivate_sessions(identity).await.unwrap();
            store.insert_session(&session(identity, token)).await.unwrap();
        }

        assert_eq!(store.active_session_count(identity).await.unwrap(), 1);
        let latest = store.latest_active_session(identity).await.unwrap().unwrap();
        assert_eq!(latest.token, SessionToken::from("third"));
    }

    #[tokio::test]
    async fn test_resolve_audit_is_idempotent() {
        let store = MemoryStore::new();
        let event = audit_event();
        store.append_audit(&event).await.unwrap();

        store.resolve_audit(event.id).await.unwrap();
        store.resolve_audit(event.id).await.unwrap();

        let stored = store.audit_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.resolution_status, ResolutionStatus::Resolved);
    }

    #[tokio::test]
    async fn test_resolve_missing_event_is_not_found() {
        let store = MemoryStore::new();
        let result = store.resolve_audit(AuditEventId::generate()).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_append_blacklisted_ip_is_idempotent() {
        let store = MemoryStore::new();
        store.append_blacklisted_ip("203.0.113.9").await.unwrap();
        store.append_blacklisted_ip("203.0.113.9").await.unwrap();

        let settings = store.site_settings().await.unwrap();
        assert_eq!(settings.blacklisted_ips, vec!["203.0.113.9"]);
    }

    #[tokio::test]
    async fn test_set_profile_slug_requires_matching_identity() {
        let store = MemoryStore::new();
        let p = profile();
        store.upsert_profile(&p).await.unwrap();

        let slug = RoutingSlug::parse("k3v9x2aq").unwrap();
        store.set_profile_slug(p.id, &slug).await.unwrap();
        assert_eq!(
            store.profile().await.unwrap().unwrap().current_session_slug,
            Some(slug.clone())
        );

        let other = IdentityId::generate();
        assert!(matches!(
            store.set_profile_slug(other, &slug).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_recent_audit_newest_first() {
        let store = MemoryStore::new();
        let first = audit_event();
        let second = audit_event();
        store.append_audit(&first).await.unwrap();
        store.append_audit(&second).await.unwrap();

        let recent = store.recent_audit(10).await.unwrap();
        assert_eq!(recent.first().map(|e| e.id), Some(second.id));
    }
}
