//! Domain models for the admin console.
//!
//! # Models
//!
//! - [`profile`] - The singleton operator identity and its routing slug
//! - [`session`] - Device login sessions and the per-context auth state
//! - [`audit`] - Append-only security audit events
//! - [`settings`] - The singleton site settings row
//! - [`chat`] - Encrypted chat rooms and messages

pub mod audit;
pub mod chat;
pub mod profile;
pub mod session;
pub mod settings;

pub use audit::{AuditEvent, AuditEventType, NewAuditEvent, ResolutionStatus, ThreatSeverity};
pub use chat::{ChatRoom, Message};
pub use profile::Profile;
pub use session::{AuthState, CurrentIdentity, LoginSession, session_keys};
pub use settings::SiteSettings;
