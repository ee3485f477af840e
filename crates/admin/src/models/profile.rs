//! Operator profile domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ridgeline_core::{Email, IdentityId, RoutingSlug};

/// The administrative identity's profile record.
///
/// There is exactly one operator. The email is immutable and is the sole
/// authorization credential; `current_session_slug` is rewritten on every
/// login and is the source of truth for vault path validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Unique identity ID.
    pub id: IdentityId,
    /// The operator's email address (immutable).
    pub email: Email,
    /// Display name.
    pub full_name: String,
    /// The routing slug minted by the most recent login, if any.
    pub current_session_slug: Option<RoutingSlug>,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
}
