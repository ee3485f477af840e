//! Business logic services for the admin console.
//!
//! # Services
//!
//! - `session_authority` - single-active-session login, revalidation, slug rotation
//! - `telemetry` - per-context behavioral event collection
//! - `heuristics` - the declarative threat rule table
//! - `e2ee` - room key derivation and AES-GCM message encryption
//! - `chat` - encrypt-then-store messaging over the E2EE channel
//! - `geo` - geolocation lookup with sentinel fallback
//! - `notify` - bounded background queue for threat-alert email
//! - `realtime` - in-process push hub behind the SSE feeds

pub mod chat;
pub mod e2ee;
pub mod geo;
pub mod heuristics;
pub mod notify;
pub mod realtime;
pub mod session_authority;
pub mod telemetry;

pub use chat::{ChatError, ChatService, DECRYPT_PLACEHOLDER, DecryptedMessage};
pub use e2ee::{DecryptError, EncryptError, KeyDerivation, PassphraseDerivation, RoomKey};
pub use geo::{GeoInfo, GeoLookup, IpApiLookup};
pub use heuristics::{RuleSet, ThreatKind, burst_threshold};
pub use notify::{EmailError, EmailService, Notifier, ThreatAlert};
pub use realtime::{EventHub, Push};
pub use session_authority::{
    AuthError, LoginSuccess, Revalidation, SLUG_COOKIE, SessionAuthority, SlugCheck,
};
pub use telemetry::{ClientEvent, CollectorDeps, CollectorRegistry, TelemetryCollector};
