//! Storage boundary for the admin console.
//!
//! The durable store is external to this system and exposes simple
//! key-value and append semantics. The [`Store`] trait is the whole
//! contract; [`PgStore`] backs production and [`MemoryStore`] backs tests.
//!
//! ## Tables
//!
//! - `login_sessions` - one row per device login, at most one active per identity
//! - `profiles` - the singleton operator record, carries the current routing slug
//! - `security_audit_logs` - append-only audit events
//! - `site_settings` - singleton policy row
//! - `chat_rooms` / `messages` - encrypted messaging
//!
//! # Migrations
//!
//! Migrations live in `crates/admin/migrations/` and are applied explicitly
//! via `sqlx migrate run`; they are not run on startup.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use ridgeline_core::{AuditEventId, ChatRoomId, IdentityId, RoutingSlug, SessionToken};

use crate::models::{AuditEvent, ChatRoom, LoginSession, Message, Profile, SiteSettings};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur at the storage boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,
}

/// The external durable store this core depends on.
///
/// All writes are plain overwrites or appends; there are no
/// read-modify-write transactions. Concurrent writers fully replace the
/// fields they own, which is what makes last-writer-wins login safe.
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap connectivity probe for the readiness endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    // -- profiles ------------------------------------------------------------

    /// Fetch the singleton operator profile.
    async fn profile(&self) -> Result<Option<Profile>, StoreError>;

    /// Insert or fully replace the operator profile.
    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StoreError>;

    /// Overwrite the profile's routing slug.
    async fn set_profile_slug(
        &self,
        identity_id: IdentityId,
        slug: &RoutingSlug,
    ) -> Result<(), StoreError>;

    // -- login sessions ------------------------------------------------------

    /// Mark every session for the identity inactive.
    async fn deactivate_sessions(&self, identity_id: IdentityId) -> Result<(), StoreError>;

    /// Insert a new login session row.
    async fn insert_session(&self, session: &LoginSession) -> Result<(), StoreError>;

    /// The most recently created active session for the identity, if any.
    async fn latest_active_session(
        &self,
        identity_id: IdentityId,
    ) -> Result<Option<LoginSession>, StoreError>;

    /// How many sessions are currently active for the identity.
    async fn active_session_count(&self, identity_id: IdentityId) -> Result<u64, StoreError>;

    /// Deactivate the session holding the given token, if it exists.
    async fn deactivate_token(&self, token: &SessionToken) -> Result<(), StoreError>;

    // -- audit log -----------------------------------------------------------

    /// Append an event to the audit log.
    async fn append_audit(&self, event: &AuditEvent) -> Result<(), StoreError>;

    /// The most recent events, newest first.
    async fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEvent>, StoreError>;

    /// Fetch one audit event.
    async fn audit_event(&self, id: AuditEventId) -> Result<Option<AuditEvent>, StoreError>;

    /// Mark an event resolved. Idempotent; resolving twice is a no-op.
    async fn resolve_audit(&self, id: AuditEventId) -> Result<(), StoreError>;

    // -- site settings -------------------------------------------------------

    /// Fetch the singleton settings row, or defaults if it was never written.
    async fn site_settings(&self) -> Result<SiteSettings, StoreError>;

    /// Fully replace the settings row.
    async fn update_site_settings(&self, settings: &SiteSettings) -> Result<(), StoreError>;

    /// Append an IP to the blacklist. Idempotent; a present IP is left alone.
    async fn append_blacklisted_ip(&self, ip: &str) -> Result<(), StoreError>;

    // -- chat ----------------------------------------------------------------

    /// Insert a chat room.
    async fn insert_room(&self, room: &ChatRoom) -> Result<(), StoreError>;

    /// All chat rooms, newest first.
    async fn rooms(&self) -> Result<Vec<ChatRoom>, StoreError>;

    /// Fetch one chat room.
    async fn room(&self, id: ChatRoomId) -> Result<Option<ChatRoom>, StoreError>;

    /// Append a message to its room.
    async fn insert_message(&self, message: &Message) -> Result<(), StoreError>;

    /// All messages in a room, oldest first.
    async fn messages(&self, room_id: ChatRoomId) -> Result<Vec<Message>, StoreError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
