//! Append-only security audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ridgeline_core::{AuditEventId, IdentityId};

/// The kind of event recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A page was viewed.
    PageView,
    /// An element was clicked.
    Click,
    /// A form field was touched.
    FormInteraction,
    /// A threat heuristic fired.
    ThreatDetected,
    /// A successful credential check.
    LoginSuccess,
}

impl AuditEventType {
    /// Stable string form used in the durable store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::Click => "click",
            Self::FormInteraction => "form_interaction",
            Self::ThreatDetected => "threat_detected",
            Self::LoginSuccess => "login_success",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "page_view" => Some(Self::PageView),
            "click" => Some(Self::Click),
            "form_interaction" => Some(Self::FormInteraction),
            "threat_detected" => Some(Self::ThreatDetected),
            "login_success" => Some(Self::LoginSuccess),
            _ => None,
        }
    }
}

/// Severity assigned by a threat rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatSeverity {
    /// Informational.
    Low,
    /// Worth a look.
    Medium,
    /// Likely hostile.
    High,
    /// Act now.
    Critical,
}

impl ThreatSeverity {
    /// Stable string form used in event metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Resolution status of an audit event.
///
/// The only mutable field on an event, and the transition is one-way:
/// `open → resolved`. Resolving an already resolved event is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Not yet handled by an operator.
    Open,
    /// Handled; terminal.
    Resolved,
}

impl ResolutionStatus {
    /// Stable string form used in the durable store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// An immutable audit log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID.
    pub id: AuditEventId,
    /// Which surface of the platform emitted the event.
    pub subdomain: String,
    /// What happened.
    pub event_type: AuditEventType,
    /// Identity associated with the event, if one was signed in.
    pub identity_id: Option<IdentityId>,
    /// Source IP as resolved at emission time.
    pub ip_address: String,
    /// Device descriptor.
    pub user_agent: String,
    /// Country as resolved at emission time.
    pub country: String,
    /// Free-form event detail (path, threat type, field names, ...).
    pub metadata: serde_json::Value,
    /// Operator resolution state.
    pub resolution_status: ResolutionStatus,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

/// Everything needed to append a new audit event.
///
/// The store assigns the ID, the `open` status, and the timestamp.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    /// Which surface of the platform emitted the event.
    pub subdomain: String,
    /// What happened.
    pub event_type: AuditEventType,
    /// Identity associated with the event, if one was signed in.
    pub identity_id: Option<IdentityId>,
    /// Source IP as resolved at emission time.
    pub ip_address: String,
    /// Device descriptor.
    pub user_agent: String,
    /// Country as resolved at emission time.
    pub country: String,
    /// Free-form event detail.
    pub metadata: serde_json::Value,
}

impl NewAuditEvent {
    /// Materialize into a full event with a fresh ID and timestamp.
    #[must_use]
    pub fn into_event(self) -> AuditEvent {
        AuditEvent {
            id: AuditEventId::generate(),
            subdomain: self.subdomain,
            event_type: self.event_type,
            identity_id: self.identity_id,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            country: self.country,
            metadata: self.metadata,
            resolution_status: ResolutionStatus::Open,
            created_at: Utc::now(),
        }
    }
}
