//! Threat heuristics: a declarative rule table evaluated by the
//! telemetry collector.
//!
//! Thresholds are data, not code. The burst threshold scales linearly with
//! the settings row's bot-sensitivity scalar; the honeypot list is a fixed
//! set of path prefixes no legitimate operator ever requests.

use std::time::Duration;

use crate::models::ThreatSeverity;

/// Paths that exist only to be probed. A single request to any of these is
/// a threat signal, independent of rate-window state.
pub const HONEYPOT_PATHS: &[&str] = &[
    "/wp-admin",
    "/admin-php",
    "/.env",
    "/config",
    "/backup",
    "/wp-login.php",
];

/// Two interactions closer together than this count toward a burst.
pub const BURST_INTERVAL: Duration = Duration::from_millis(1000);

/// Burst threshold at sensitivity 0.
const RELAXED_BURST_THRESHOLD: f64 = 30.0;

/// Burst threshold at sensitivity 1.
const STRICT_BURST_THRESHOLD: f64 = 10.0;

/// The kind of threat a rule promotes an event to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreatKind {
    /// A honeypot path was requested.
    HoneypotAccess,
    /// Interactions arrived faster than a human plausibly produces.
    BotActivity,
}

impl ThreatKind {
    /// Stable string form recorded in event metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HoneypotAccess => "honeypot_access",
            Self::BotActivity => "bot_activity",
        }
    }
}

/// What a rule matches against.
#[derive(Debug, Clone, Copy)]
pub enum Trigger {
    /// The navigated path starts with any of these prefixes.
    PathPrefix(&'static [&'static str]),
    /// The sliding rate window crossed its threshold.
    BurstThresholdCrossed,
}

/// One entry in the rule table.
#[derive(Debug, Clone, Copy)]
pub struct ThreatRule {
    /// What fires the rule.
    pub trigger: Trigger,
    /// What the event is promoted to.
    pub kind: ThreatKind,
    /// Severity recorded on the resulting event.
    pub severity: ThreatSeverity,
}

/// A signal the collector feeds into the rule set.
#[derive(Debug, Clone, Copy)]
pub enum Signal<'a> {
    /// A path was navigated to.
    Path(&'a str),
    /// The rate window just crossed its threshold.
    BurstCrossed,
}

/// The outcome of a matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    /// The promoted threat kind.
    pub kind: ThreatKind,
    /// The rule's severity.
    pub severity: ThreatSeverity,
}

/// The evaluated rule table.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<ThreatRule>,
}

impl RuleSet {
    /// The built-in rules: honeypot prefixes are critical, bursts are high.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            rules: vec![
                ThreatRule {
                    trigger: Trigger::PathPrefix(HONEYPOT_PATHS),
                    kind: ThreatKind::HoneypotAccess,
                    severity: ThreatSeverity::Critical,
                },
                ThreatRule {
                    trigger: Trigger::BurstThresholdCrossed,
                    kind: ThreatKind::BotActivity,
                    severity: ThreatSeverity::High,
                },
            ],
        }
    }

    /// A custom rule table, mostly for tests.
    #[must_use]
    pub const fn new(rules: Vec<ThreatRule>) -> Self {
        Self { rules }
    }

    /// Evaluate one signal against the table, first match wins.
    #[must_use]
    pub fn evaluate(&self, signal: Signal<'_>) -> Option<Detection> {
        self.rules.iter().find_map(|rule| {
            let fired = match (rule.trigger, signal) {
                (Trigger::PathPrefix(prefixes), Signal::Path(path)) => {
                    prefixes.iter().any(|prefix| path.starts_with(prefix))
                }
                (Trigger::BurstThresholdCrossed, Signal::BurstCrossed) => true,
                _ => false,
            };
            fired.then_some(Detection {
                kind: rule.kind,
                severity: rule.severity,
            })
        })
    }
}

/// The burst threshold for a given bot-sensitivity scalar.
///
/// Linear between 30 interactions (sensitivity 0, relaxed) and 10
/// (sensitivity 1, strict); out-of-range input is clamped.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Bounded to 10..=30
pub fn burst_threshold(sensitivity: f64) -> u32 {
    let s = sensitivity.clamp(0.0, 1.0);
    let threshold = RELAXED_BURST_THRESHOLD + s * (STRICT_BURST_THRESHOLD - RELAXED_BURST_THRESHOLD);
    threshold.round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_threshold_endpoints() {
        assert_eq!(burst_threshold(0.0), 30);
        assert_eq!(burst_threshold(1.0), 10);
        assert_eq!(burst_threshold(0.5), 20);
    }

    #[test]
    fn test_burst_threshold_clamps_out_of_range() {
        assert_eq!(burst_threshold(-2.0), 30);
        assert_eq!(burst_threshold(9.0), 10);
    }

    #[test]
    fn test_honeypot_prefix_match() {
        let rules = RuleSet::builtin();

        let detection = rules.evaluate(Signal::Path("/wp-admin/setup.php"));
        assert_eq!(
            detection,
            Some(Detection {
                kind: ThreatKind::HoneypotAccess,
                severity: ThreatSeverity::Critical,
            })
        );

        assert!(rules.evaluate(Signal::Path("/vault/k3v9x2aq/dashboard")).is_none());
    }

    #[test]
    fn test_every_builtin_honeypot_path_fires() {
        let rules = RuleSet::builtin();
        for path in HONEYPOT_PATHS.iter().copied() {
            assert!(rules.evaluate(Signal::Path(path)).is_some(), "{path}");
        }
    }

    #[test]
    fn test_burst_signal_fires_bot_rule() {
        let rules = RuleSet::builtin();
        let detection = rules.evaluate(Signal::BurstCrossed);
        assert_eq!(
            detection,
            Some(Detection {
                kind: ThreatKind::BotActivity,
                severity: ThreatSeverity::High,
            })
        );
    }

    #[test]
    fn test_empty_rule_set_never_fires() {
        let rules = RuleSet::new(Vec::new());
        assert!(rules.evaluate(Signal::Path("/wp-admin")).is_none());
        assert!(rules.evaluate(Signal::BurstCrossed).is_none());
    }
}
