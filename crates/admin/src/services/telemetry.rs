//! Behavioral telemetry collection.
//!
//! One collector exists per client context (browser tab). Each holds its
//! own TTL dedup set, page-view memory, leaky-bucket rate window, and
//! memoized geolocation; two contexts deliberately do not share state, so
//! the same physical interaction performed in two tabs is logged twice.
//!
//! A collector never errors outward: storage failures are logged and
//! swallowed, geolocation failures collapse into the sentinel, and
//! notification dispatch is queued fire-and-forget.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::OnceCell;

use ridgeline_core::IdentityId;

use crate::db::Store;
use crate::models::{AuditEvent, AuditEventType, NewAuditEvent, SiteSettings};
use crate::services::geo::GeoLookup;
use crate::services::heuristics::{BURST_INTERVAL, Detection, RuleSet, Signal, burst_threshold};
use crate::services::notify::{Notifier, ThreatAlert};
use crate::services::realtime::{EventHub, Push};

/// How long an identical interaction is suppressed.
const DEDUP_TTL: Duration = Duration::from_secs(60);

/// Collectors idle longer than this are dropped from the registry.
const COLLECTOR_IDLE: Duration = Duration::from_secs(30 * 60);

/// An event reported by the client runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEvent {
    /// What happened.
    pub event_type: AuditEventType,
    /// The path the event occurred on.
    pub path: String,
    /// The interaction target (element id, field name), if any.
    #[serde(default)]
    pub target: Option<String>,
    /// Free-form detail from the client.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Everything a collector needs to emit events.
#[derive(Clone)]
pub struct CollectorDeps {
    /// The durable store.
    pub store: Arc<dyn Store>,
    /// Geolocation source.
    pub geo: Arc<dyn GeoLookup>,
    /// Realtime push hub.
    pub hub: EventHub,
    /// Threat-alert queue.
    pub notifier: Notifier,
    /// The threat rule table.
    pub rules: RuleSet,
    /// Subdomain tag stamped on emitted events.
    pub subdomain: String,
}

/// Sliding rate window over interaction timestamps.
///
/// Counts interactions arriving faster than the burst interval; a
/// sufficiently idle gap resets the count to one. The caller resets the
/// count to zero after acting on a threshold crossing, which is what makes
/// a 20-interaction burst produce exactly one threat event.
#[derive(Debug, Default)]
struct RateWindow {
    count: u32,
    last: Option<Instant>,
}

impl RateWindow {
    fn record(&mut self, now: Instant, interval: Duration) -> u32 {
        match self.last {
            Some(prev) if now.duration_since(prev) < interval => self.count += 1,
            _ => self.count = 1,
        }
        self.last = Some(now);
        self.count
    }

    const fn reset(&mut self) {
        self.count = 0;
    }
}

/// Per-client-context telemetry collector.
pub struct TelemetryCollector {
    deps: CollectorDeps,
    dedup: moka::sync::Cache<String, ()>,
    seen_paths: Mutex<HashSet<String>>,
    rate: Mutex<RateWindow>,
    geo_cache: OnceCell<crate::services::geo::GeoInfo>,
}

impl TelemetryCollector {
    /// Create a collector with fresh per-context state.
    #[must_use]
    pub fn new(deps: CollectorDeps) -> Self {
        Self {
            deps,
            dedup: moka::sync::Cache::builder()
                .time_to_live(DEDUP_TTL)
                .max_capacity(10_000)
                .build(),
            seen_paths: Mutex::new(HashSet::new()),
            rate: Mutex::new(RateWindow::default()),
            geo_cache: OnceCell::new(),
        }
    }

    /// Observe one client event.
    ///
    /// Never fails: every downstream failure degrades locally.
    pub async fn observe(
        &self,
        identity_id: Option<IdentityId>,
        user_agent: &str,
        event: ClientEvent,
    ) {
        let settings = match self.deps.store.site_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "settings read failed, using defaults");
                SiteSettings::default()
            }
        };

        // Honeypot paths bypass the rate window and dedup entirely.
        if let Some(detection) = self.deps.rules.evaluate(Signal::Path(&event.path)) {
            self.emit_threat(identity_id, user_agent, &event.path, detection, &settings)
                .await;
        }

        match event.event_type {
            AuditEventType::PageView => {
                if !self.first_view(&event.path) {
                    return;
                }
            }
            AuditEventType::Click | AuditEventType::FormInteraction => {
                let threshold = burst_threshold(settings.clamped_sensitivity());
                let crossed = {
                    #[allow(clippy::unwrap_used)]
                    let mut window = self.rate.lock().unwrap();
                    let count = window.record(Instant::now(), BURST_INTERVAL);
                    if count > threshold {
                        window.reset();
                        true
                    } else {
                        false
                    }
                };
                if crossed {
                    if let Some(detection) = self.deps.rules.evaluate(Signal::BurstCrossed) {
                        self.emit_threat(identity_id, user_agent, &event.path, detection, &settings)
                            .await;
                    }
                }

                let key = dedup_key(event.event_type, event.target.as_deref(), &event.path);
                if self.dedup.contains_key(&key) {
                    return;
                }
                self.dedup.insert(key, ());
            }
            // The collector mints threat and login events itself; a client
            // claiming them is recorded as-is but gets no special handling.
            AuditEventType::ThreatDetected | AuditEventType::LoginSuccess => {}
        }

        let mut metadata = event.metadata;
        attach_path(&mut metadata, &event.path);
        self.persist(identity_id, user_agent, event.event_type, metadata)
            .await;
    }

    /// Emit a `threat_detected` event and queue a notification if the
    /// settings row carries a recipient.
    async fn emit_threat(
        &self,
        identity_id: Option<IdentityId>,
        user_agent: &str,
        path: &str,
        detection: Detection,
        settings: &SiteSettings,
    ) {
        let metadata = serde_json::json!({
            "threat_type": detection.kind.as_str(),
            "severity": detection.severity.as_str(),
            "path": path,
        });

        let event = self
            .persist(
                identity_id,
                user_agent,
                AuditEventType::ThreatDetected,
                metadata,
            )
            .await;

        if let Some(recipient) = &settings.notification_email {
            self.deps.notifier.enqueue(ThreatAlert {
                threat_type: detection.kind.as_str().to_string(),
                ip: event.ip_address.clone(),
                location: event.country.clone(),
                path: path.to_string(),
                recipient: recipient.clone(),
            });
        }
    }

    /// Enrich, persist, and publish one event. Storage failure is logged
    /// and swallowed; the built event is returned either way.
    async fn persist(
        &self,
        identity_id: Option<IdentityId>,
        user_agent: &str,
        event_type: AuditEventType,
        metadata: serde_json::Value,
    ) -> AuditEvent {
        let geo = self
            .geo_cache
            .get_or_init(|| self.deps.geo.lookup())
            .await
            .clone();

        let event = NewAuditEvent {
            subdomain: self.deps.subdomain.clone(),
            event_type,
            identity_id,
            ip_address: geo.ip,
            user_agent: user_agent.to_string(),
            country: geo.country,
            metadata,
        }
        .into_event();

        if let Err(e) = self.deps.store.append_audit(&event).await {
            tracing::warn!(error = %e, event_type = %event_type.as_str(), "audit append failed");
        }
        self.deps.hub.publish(Push::AuditInserted {
            event: event.clone(),
        });

        event
    }

    /// True the first time a path is viewed in this context.
    #[allow(clippy::unwrap_used)]
    fn first_view(&self, path: &str) -> bool {
        self.seen_paths.lock().unwrap().insert(path.to_string())
    }
}

fn dedup_key(event_type: AuditEventType, target: Option<&str>, path: &str) -> String {
    format!("{}:{}", event_type.as_str(), target.unwrap_or(path))
}

fn attach_path(metadata: &mut serde_json::Value, path: &str) {
    if let serde_json::Value::Object(map) = metadata {
        map.insert(
            "path".to_string(),
            serde_json::Value::String(path.to_string()),
        );
    } else if metadata.is_null() {
        *metadata = serde_json::json!({ "path": path });
    }
}

/// Per-context collector registry.
///
/// Contexts idle past [`COLLECTOR_IDLE`] are evicted along with their
/// dedup and rate state; a returning context simply starts fresh.
#[derive(Clone)]
pub struct CollectorRegistry {
    collectors: moka::sync::Cache<String, Arc<TelemetryCollector>>,
    deps: CollectorDeps,
}

impl CollectorRegistry {
    /// Create a registry building collectors from the given dependencies.
    #[must_use]
    pub fn new(deps: CollectorDeps) -> Self {
        Self {
            collectors: moka::sync::Cache::builder()
                .time_to_idle(COLLECTOR_IDLE)
                .max_capacity(4096)
                .build(),
            deps,
        }
    }

    /// The collector for a client context, created on first sight.
    #[must_use]
    pub fn collector(&self, context: &str) -> Arc<TelemetryCollector> {
        self.collectors.get_with(context.to_string(), || {
            Arc::new(TelemetryCollector::new(self.deps.clone()))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::db::MemoryStore;
    use crate::services::geo::GeoInfo;

    use super::*;

    /// Geo stub that counts lookups and simulates an absorbed timeout.
    struct CountingGeo {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl GeoLookup for CountingGeo {
        async fn lookup(&self) -> GeoInfo {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            GeoInfo::unknown()
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        geo: Arc<CountingGeo>,
        registry: CollectorRegistry,
    }

    fn harness(geo_delay: Duration) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let geo = Arc::new(CountingGeo {
            calls: AtomicUsize::new(0),
            delay: geo_delay,
        });
        let deps = CollectorDeps {
            store: Arc::clone(&store) as Arc<dyn Store>,
            geo: Arc::clone(&geo) as Arc<dyn GeoLookup>,
            hub: EventHub::new(),
            notifier: Notifier::spawn(None),
            rules: RuleSet::builtin(),
            subdomain: "admin".to_string(),
        };
        Harness {
            store,
            geo,
            registry: CollectorRegistry::new(deps),
        }
    }

    fn click(target: &str) -> ClientEvent {
        ClientEvent {
            event_type: AuditEventType::Click,
            path: "/vault/k3v9x2aq/dashboard".to_string(),
            target: Some(target.to_string()),
            metadata: serde_json::json!({}),
        }
    }

    fn page_view(path: &str) -> ClientEvent {
        ClientEvent {
            event_type: AuditEventType::PageView,
            path: path.to_string(),
            target: None,
            metadata: serde_json::json!({}),
        }
    }

    async fn threat_count(store: &MemoryStore, threat_type: &str) -> usize {
        store
            .recent_audit(1000)
            .await
            .unwrap()
            .iter()
            .filter(|e| {
                e.event_type == AuditEventType::ThreatDetected
                    && e.metadata.get("threat_type").and_then(|v| v.as_str()) == Some(threat_type)
            })
            .count()
    }

    async fn strict_sensitivity(store: &MemoryStore) {
        let settings = SiteSettings {
            bot_sensitivity: 1.0,
            ..SiteSettings::default()
        };
        store.update_site_settings(&settings).await.unwrap();
    }

    #[tokio::test]
    async fn test_burst_emits_exactly_one_bot_activity_event() {
        let h = harness(Duration::ZERO);
        strict_sensitivity(&h.store).await;
        let collector = h.registry.collector("tab-1");

        // 20 interactions far faster than one per second; distinct targets
        // keep dedup out of the picture.
        for i in 0..20 {
            collector.observe(None, "ua", click(&format!("btn-{i}"))).await;
        }

        assert_eq!(threat_count(&h.store, "bot_activity").await, 1);
    }

    #[tokio::test]
    async fn test_relaxed_sensitivity_needs_a_larger_burst() {
        let h = harness(Duration::ZERO);
        // Default sensitivity 0.5 -> threshold 20.
        let collector = h.registry.collector("tab-1");

        for i in 0..20 {
            collector.observe(None, "ua", click(&format!("btn-{i}"))).await;
        }
        assert_eq!(threat_count(&h.store, "bot_activity").await, 0);

        for i in 20..25 {
            collector.observe(None, "ua", click(&format!("btn-{i}"))).await;
        }
        assert_eq!(threat_count(&h.store, "bot_activity").await, 1);
    }

    #[tokio::test]
    async fn test_honeypot_path_emits_one_critical_threat() {
        let h = harness(Duration::ZERO);
        let collector = h.registry.collector("tab-1");

        collector.observe(None, "ua", page_view("/wp-admin")).await;

        assert_eq!(threat_count(&h.store, "honeypot_access").await, 1);
        let events = h.store.recent_audit(10).await.unwrap();
        let threat = events
            .iter()
            .find(|e| e.event_type == AuditEventType::ThreatDetected)
            .unwrap();
        assert_eq!(
            threat.metadata.get("severity").and_then(|v| v.as_str()),
            Some("critical")
        );
        // The page view itself is also recorded.
        assert!(
            events
                .iter()
                .any(|e| e.event_type == AuditEventType::PageView)
        );
    }

    #[tokio::test]
    async fn test_identical_clicks_dedup_within_ttl() {
        let h = harness(Duration::ZERO);
        let collector = h.registry.collector("tab-1");

        collector.observe(None, "ua", click("save-btn")).await;
        collector.observe(None, "ua", click("save-btn")).await;
        collector.observe(None, "ua", click("other-btn")).await;

        let clicks = h
            .store
            .recent_audit(100)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.event_type == AuditEventType::Click)
            .count();
        assert_eq!(clicks, 2);
    }

    #[tokio::test]
    async fn test_page_view_logged_once_per_path() {
        let h = harness(Duration::ZERO);
        let collector = h.registry.collector("tab-1");

        collector.observe(None, "ua", page_view("/vault/a/dashboard")).await;
        collector.observe(None, "ua", page_view("/vault/a/dashboard")).await;
        collector.observe(None, "ua", page_view("/vault/a/security")).await;

        let views = h
            .store
            .recent_audit(100)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.event_type == AuditEventType::PageView)
            .count();
        assert_eq!(views, 2);
    }

    #[tokio::test]
    async fn test_geolocation_resolved_once_per_context() {
        let h = harness(Duration::ZERO);
        let collector = h.registry.collector("tab-1");

        collector.observe(None, "ua", page_view("/a")).await;
        collector.observe(None, "ua", page_view("/b")).await;
        collector.observe(None, "ua", click("x")).await;

        assert_eq!(h.geo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_geolocation_still_persists_with_sentinel() {
        // The lookup stub takes 50ms and resolves to the sentinel, the way
        // the real client absorbs its 2s timeout.
        let h = harness(Duration::from_millis(50));
        let collector = h.registry.collector("tab-1");

        let start = Instant::now();
        collector.observe(None, "ua", page_view("/a")).await;
        assert!(start.elapsed() < Duration::from_secs(2));

        let events = h.store.recent_audit(10).await.unwrap();
        let event = events.first().unwrap();
        assert_eq!(event.ip_address, "0.0.0.0");
        assert_eq!(event.country, "Unknown");
    }

    #[tokio::test]
    async fn test_two_contexts_do_not_share_dedup_state() {
        // Per-tab state is a design decision, not a bug: the same
        // interaction in two tabs is logged twice.
        let h = harness(Duration::ZERO);
        let tab_a = h.registry.collector("tab-a");
        let tab_b = h.registry.collector("tab-b");

        tab_a.observe(None, "ua", click("save-btn")).await;
        tab_b.observe(None, "ua", click("save-btn")).await;

        let clicks = h
            .store
            .recent_audit(100)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.event_type == AuditEventType::Click)
            .count();
        assert_eq!(clicks, 2);
    }

    #[tokio::test]
    async fn test_registry_returns_same_collector_for_context() {
        let h = harness(Duration::ZERO);
        let a = h.registry.collector("tab-1");
        let b = h.registry.collector("tab-1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_rate_window_resets_after_idle_gap() {
        let mut window = RateWindow::default();
        let start = Instant::now();

        assert_eq!(window.record(start, BURST_INTERVAL), 1);
        assert_eq!(
            window.record(start + Duration::from_millis(100), BURST_INTERVAL),
            2
        );
        // A gap wider than the interval starts a new run.
        assert_eq!(
            window.record(start + Duration::from_secs(5), BURST_INTERVAL),
            1
        );
    }
}
