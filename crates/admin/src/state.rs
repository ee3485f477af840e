//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::AdminConfig;
use crate::db::Store;
use crate::services::chat::ChatService;
use crate::services::e2ee::PassphraseDerivation;
use crate::services::geo::{GeoLookup, IpApiLookup};
use crate::services::heuristics::RuleSet;
use crate::services::notify::{EmailService, Notifier};
use crate::services::realtime::EventHub;
use crate::services::session_authority::SessionAuthority;
use crate::services::telemetry::{CollectorDeps, CollectorRegistry};

/// Subdomain tag for events emitted by this deployment.
const SUBDOMAIN: &str = "admin";

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The geolocation HTTP client could not be constructed.
    #[error("geolocation client: {0}")]
    Geo(#[from] reqwest::Error),

    /// The SMTP transport could not be configured.
    #[error("smtp transport: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AdminConfig,
    store: Arc<dyn Store>,
    authority: SessionAuthority,
    chat: ChatService,
    collectors: CollectorRegistry,
    hub: EventHub,
    geo: Arc<dyn GeoLookup>,
}

impl AppState {
    /// Create application state with the production geolocation client.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the geolocation client or SMTP
    /// transport cannot be constructed.
    pub fn new(config: AdminConfig, store: Arc<dyn Store>) -> Result<Self, StateError> {
        let geo: Arc<dyn GeoLookup> =
            Arc::new(IpApiLookup::new(&config.geo.endpoint, config.geo.timeout)?);
        Self::with_geo(config, store, geo)
    }

    /// Create application state with an injected geolocation source.
    ///
    /// Tests swap in a stub here; everything else is wired identically to
    /// production.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the SMTP transport cannot be configured.
    pub fn with_geo(
        config: AdminConfig,
        store: Arc<dyn Store>,
        geo: Arc<dyn GeoLookup>,
    ) -> Result<Self, StateError> {
        let mailer = config.email.as_ref().map(EmailService::new).transpose()?;
        let notifier = Notifier::spawn(mailer);
        let hub = EventHub::new();

        let authority = SessionAuthority::new(
            Arc::clone(&store),
            config.admin.email.clone(),
            config.admin.password_hash.clone(),
            config.session_secret.clone(),
        );

        let chat = ChatService::new(
            Arc::clone(&store),
            Arc::new(PassphraseDerivation),
            hub.clone(),
        );

        let collectors = CollectorRegistry::new(CollectorDeps {
            store: Arc::clone(&store),
            geo: Arc::clone(&geo),
            hub: hub.clone(),
            notifier,
            rules: RuleSet::builtin(),
            subdomain: SUBDOMAIN.to_string(),
        });

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                authority,
                chat,
                collectors,
                hub,
                geo,
            }),
        })
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    /// Get a reference to the durable store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    /// Get a reference to the session authority.
    #[must_use]
    pub fn authority(&self) -> &SessionAuthority {
        &self.inner.authority
    }

    /// Get a reference to the chat service.
    #[must_use]
    pub fn chat(&self) -> &ChatService {
        &self.inner.chat
    }

    /// Get a reference to the telemetry collector registry.
    #[must_use]
    pub fn collectors(&self) -> &CollectorRegistry {
        &self.inner.collectors
    }

    /// Get a reference to the realtime push hub.
    #[must_use]
    pub fn hub(&self) -> &EventHub {
        &self.inner.hub
    }

    /// Get a reference to the geolocation source.
    #[must_use]
    pub fn geo(&self) -> &Arc<dyn GeoLookup> {
        &self.inner.geo
    }
}
