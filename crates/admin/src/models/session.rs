//! Device login sessions and per-context authentication state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ridgeline_core::{Email, IdentityId, RoutingSlug, SessionToken};

/// One authenticated device login.
///
/// Invariant: at most one row with `active = true` exists per identity.
/// A newer login deactivates every prior row before inserting its own,
/// so the most recently created active row is always authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSession {
    /// Opaque token handed to the device for local storage.
    pub token: SessionToken,
    /// Identity that owns this session.
    pub identity_id: IdentityId,
    /// Device descriptor (user-agent string).
    pub user_agent: String,
    /// Whether this session is still the live one.
    pub active: bool,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

/// Identity data stored in the HTTP session cookie.
///
/// This is a cache for the perimeter check only; authorization decisions
/// reconcile against the session table and profile row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentIdentity {
    /// The operator's identity ID.
    pub id: IdentityId,
    /// The operator's email address.
    pub email: Email,
}

/// Session keys for authentication data.
pub mod session_keys {
    /// Key for storing the current logged-in identity.
    pub const CURRENT_IDENTITY: &str = "current_identity";
}

/// Authentication state of one browser context.
///
/// `Unauthenticated → Authenticating → Authenticated(slug)`, with slug
/// correction staying in `Authenticated` and takeover or sign-out dropping
/// back to `Unauthenticated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    /// No identity; the context must go through the auth entry point.
    Unauthenticated,
    /// A credential check is in flight.
    Authenticating,
    /// The context holds the given routing slug.
    Authenticated {
        /// The slug this context navigates under.
        slug: RoutingSlug,
    },
}

impl AuthState {
    /// Transition on a successful login or a slug correction.
    #[must_use]
    pub const fn authenticated(slug: RoutingSlug) -> Self {
        Self::Authenticated { slug }
    }

    /// Transition on takeover eviction or explicit sign-out.
    #[must_use]
    pub fn evicted(self) -> Self {
        Self::Unauthenticated
    }

    /// Whether this context may render protected content.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}
