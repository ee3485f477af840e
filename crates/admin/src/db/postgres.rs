//! `PostgreSQL`-backed store.
//!
//! Queries are runtime-bound (`sqlx::query_as` with explicit binds) so the
//! crate builds without a live database; the schema lives in
//! `crates/admin/migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use ridgeline_core::{
    AuditEventId, ChatRoomId, Email, IdentityId, MessageId, RoutingSlug, SessionToken,
};

use crate::models::{
    AuditEvent, AuditEventType, ChatRoom, LoginSession, Message, Profile, ResolutionStatus,
    SiteSettings,
};

use super::{Store, StoreError};

/// The singleton row ID for `site_settings`.
const SETTINGS_ROW_ID: i16 = 1;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    email: String,
    full_name: String,
    current_session_slug: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email)
            .map_err(|e| StoreError::DataCorruption(format!("profile email: {e}")))?;
        let current_session_slug = row
            .current_session_slug
            .as_deref()
            .map(RoutingSlug::parse)
            .transpose()
            .map_err(|e| StoreError::DataCorruption(format!("profile slug: {e}")))?;

        Ok(Self {
            id: IdentityId::new(row.id),
            email,
            full_name: row.full_name,
            current_session_slug,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    token: String,
    identity_id: Uuid,
    user_agent: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for LoginSession {
    fn from(row: SessionRow) -> Self {
        Self {
            token: SessionToken::new(row.token),
            identity_id: IdentityId::new(row.identity_id),
            user_agent: row.user_agent,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    subdomain: String,
    event_type: String,
    identity_id: Option<Uuid>,
    ip_address: String,
    user_agent: String,
    country: String,
    metadata: serde_json::Value,
    resolution_status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEvent {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let event_type = AuditEventType::parse(&row.event_type).ok_or_else(|| {
            StoreError::DataCorruption(format!("unknown event type: {}", row.event_type))
        })?;
        let resolution_status = ResolutionStatus::parse(&row.resolution_status).ok_or_else(|| {
            StoreError::DataCorruption(format!(
                "unknown resolution status: {}",
                row.resolution_status
            ))
        })?;

        Ok(Self {
            id: AuditEventId::new(row.id),
            subdomain: row.subdomain,
            event_type,
            identity_id: row.identity_id.map(IdentityId::new),
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            country: row.country,
            metadata: row.metadata,
            resolution_status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    maintenance_mode: bool,
    notification_email: Option<String>,
    firewall_active: bool,
    captcha_enabled: bool,
    bot_sensitivity: f64,
    whitelisted_ips: Vec<String>,
    blacklisted_ips: Vec<String>,
    blocked_countries: Vec<String>,
}

impl TryFrom<SettingsRow> for SiteSettings {
    type Error = StoreError;

    fn try_from(row: SettingsRow) -> Result<Self, Self::Error> {
        let notification_email = row
            .notification_email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| StoreError::DataCorruption(format!("notification email: {e}")))?;

        Ok(Self {
            maintenance_mode: row.maintenance_mode,
            notification_email,
            firewall_active: row.firewall_active,
            captcha_enabled: row.captcha_enabled,
            bot_sensitivity: row.bot_sensitivity,
            whitelisted_ips: row.whitelisted_ips,
            blacklisted_ips: row.blacklisted_ips,
            blocked_countries: row.blocked_countries,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RoomRow {
    id: Uuid,
    counterpart_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<RoomRow> for ChatRoom {
    fn from(row: RoomRow) -> Self {
        Self {
            id: ChatRoomId::new(row.id),
            counterpart_id: IdentityId::new(row.counterpart_id),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    room_id: Uuid,
    sender_id: Uuid,
    ciphertext: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId::new(row.id),
            room_id: ChatRoomId::new(row.room_id),
            sender_id: IdentityId::new(row.sender_id),
            ciphertext: row.ciphertext,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// A [`Store`] backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for health probes.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn profile(&self) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, email, full_name, current_session_slug, created_at
             FROM profiles
             ORDER BY created_at
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(Profile::try_from).transpose()
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO profiles (id, email, full_name, current_session_slug, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE
             SET email = EXCLUDED.email,
                 full_name = EXCLUDED.full_name,
                 current_session_slug = EXCLUDED.current_session_slug",
        )
        .bind(profile.id.as_uuid())
        .bind(profile.email.as_str())
        .bind(&profile.full_name)
        .bind(profile.current_session_slug.as_ref().map(RoutingSlug::as_str))
        .bind(profile.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_profile_slug(
        &self,
        identity_id: IdentityId,
        slug: &RoutingSlug,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE profiles SET current_session_slug = $1 WHERE id = $2")
            .bind(slug.as_str())
            .bind(identity_id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn deactivate_sessions(&self, identity_id: IdentityId) -> Result<(), StoreError> {
        sqlx::query("UPDATE login_sessions SET active = FALSE WHERE identity_id = $1")
            .bind(identity_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_session(&self, session: &LoginSession) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO login_sessions (token, identity_id, user_agent, active, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.token.as_str())
        .bind(session.identity_id.as_uuid())
        .bind(&session.user_agent)
        .bind(session.active)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_active_session(
        &self,
        identity_id: IdentityId,
    ) -> Result<Option<LoginSession>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT token, identity_id, user_agent, active, created_at
             FROM login_sessions
             WHERE identity_id = $1 AND active = TRUE
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(identity_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(LoginSession::from))
    }

    async fn active_session_count(&self, identity_id: IdentityId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM login_sessions WHERE identity_id = $1 AND active = TRUE",
        )
        .bind(identity_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.unsigned_abs())
    }

    async fn deactivate_token(&self, token: &SessionToken) -> Result<(), StoreError> {
        sqlx::query("UPDATE login_sessions SET active = FALSE WHERE token = $1")
            .bind(token.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO security_audit_logs
                 (id, subdomain, event_type, identity_id, ip_address, user_agent,
                  country, metadata, resolution_status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(event.id.as_uuid())
        .bind(&event.subdomain)
        .bind(event.event_type.as_str())
        .bind(event.identity_id.map(|id| id.as_uuid()))
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.country)
        .bind(&event.metadata)
        .bind(event.resolution_status.as_str())
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEvent>, StoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, subdomain, event_type, identity_id, ip_address, user_agent,
                    country, metadata, resolution_status, created_at
             FROM security_audit_logs
             ORDER BY created_at DESC
             LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }

    async fn audit_event(&self, id: AuditEventId) -> Result<Option<AuditEvent>, StoreError> {
        let row = sqlx::query_as::<_, AuditRow>(
            "SELECT id, subdomain, event_type, identity_id, ip_address, user_agent,
                    country, metadata, resolution_status, created_at
             FROM security_audit_logs
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(AuditEvent::try_from).transpose()
    }

    async fn resolve_audit(&self, id: AuditEventId) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE security_audit_logs SET resolution_status = 'resolved' WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn site_settings(&self) -> Result<SiteSettings, StoreError> {
        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT maintenance_mode, notification_email, firewall_active, captcha_enabled,
                    bot_sensitivity, whitelisted_ips, blacklisted_ips, blocked_countries
             FROM site_settings
             WHERE id = $1",
        )
        .bind(SETTINGS_ROW_ID)
        .fetch_optional(&self.pool)
        .await?;

        row.map_or_else(|| Ok(SiteSettings::default()), SiteSettings::try_from)
    }

    async fn update_site_settings(&self, settings: &SiteSettings) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO site_settings
                 (id, maintenance_mode, notification_email, firewall_active, captcha_enabled,
                  bot_sensitivity, whitelisted_ips, blacklisted_ips, blocked_countries, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
             ON CONFLICT (id) DO UPDATE
             SET maintenance_mode = EXCLUDED.maintenance_mode,
                 notification_email = EXCLUDED.notification_email,
                 firewall_active = EXCLUDED.firewall_active,
                 captcha_enabled = EXCLUDED.captcha_enabled,
                 bot_sensitivity = EXCLUDED.bot_sensitivity,
                 whitelisted_ips = EXCLUDED.whitelisted_ips,
                 blacklisted_ips = EXCLUDED.blacklisted_ips,
                 blocked_countries = EXCLUDED.blocked_countries,
                 updated_at = NOW()",
        )
        .bind(SETTINGS_ROW_ID)
        .bind(settings.maintenance_mode)
        .bind(settings.notification_email.as_ref().map(Email::as_str))
        .bind(settings.firewall_active)
        .bind(settings.captcha_enabled)
        .bind(settings.bot_sensitivity)
        .bind(&settings.whitelisted_ips)
        .bind(&settings.blacklisted_ips)
        .bind(&settings.blocked_countries)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_blacklisted_ip(&self, ip: &str) -> Result<(), StoreError> {
        // array_append guarded by ANY keeps this idempotent without a
        // read-modify-write round trip.
        sqlx::query(
            "UPDATE site_settings
             SET blacklisted_ips = array_append(blacklisted_ips, $1),
                 updated_at = NOW()
             WHERE id = $2 AND NOT ($1 = ANY(blacklisted_ips))",
        )
        .bind(ip)
        .bind(SETTINGS_ROW_ID)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_room(&self, room: &ChatRoom) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO chat_rooms (id, counterpart_id, created_at) VALUES ($1, $2, $3)")
            .bind(room.id.as_uuid())
            .bind(room.counterpart_id.as_uuid())
            .bind(room.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rooms(&self) -> Result<Vec<ChatRoom>, StoreError> {
        let rows = sqlx::query_as::<_, RoomRow>(
            "SELECT id, counterpart_id, created_at FROM chat_rooms ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatRoom::from).collect())
    }

    async fn room(&self, id: ChatRoomId) -> Result<Option<ChatRoom>, StoreError> {
        let row = sqlx::query_as::<_, RoomRow>(
            "SELECT id, counterpart_id, created_at FROM chat_rooms WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ChatRoom::from))
    }

    async fn insert_message(&self, message: &Message) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO messages (id, room_id, sender_id, ciphertext, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(message.id.as_uuid())
        .bind(message.room_id.as_uuid())
        .bind(message.sender_id.as_uuid())
        .bind(&message.ciphertext)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn messages(&self, room_id: ChatRoomId) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, room_id, sender_id, ciphertext, created_at
             FROM messages
             WHERE room_id = $1
             ORDER BY created_at",
        )
        .bind(room_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }
}
