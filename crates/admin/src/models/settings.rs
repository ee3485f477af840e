//! The singleton site settings row.

use serde::{Deserialize, Serialize};

use ridgeline_core::Email;

/// Platform-wide security and notification configuration.
///
/// Mutated only through the security console; the telemetry pipeline reads
/// it for policy parameters (notification target, bot sensitivity, IP and
/// country lists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSettings {
    /// Platform-wide maintenance flag.
    pub maintenance_mode: bool,
    /// Where threat alerts are sent. `None` disables notification dispatch.
    pub notification_email: Option<Email>,
    /// Platform-wide lockdown; whitelisted IPs bypass it.
    pub firewall_active: bool,
    /// Whether captcha challenges are presented on public forms.
    pub captcha_enabled: bool,
    /// Bot detection sensitivity, 0.0 (relaxed) to 1.0 (strict).
    pub bot_sensitivity: f64,
    /// IPs that bypass the firewall.
    pub whitelisted_ips: Vec<String>,
    /// IPs denied outright.
    pub blacklisted_ips: Vec<String>,
    /// Countries denied outright.
    pub blocked_countries: Vec<String>,
}

impl SiteSettings {
    /// Clamp the sensitivity scalar into its documented range.
    #[must_use]
    pub fn clamped_sensitivity(&self) -> f64 {
        self.bot_sensitivity.clamp(0.0, 1.0)
    }
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            maintenance_mode: false,
            notification_email: None,
            firewall_active: false,
            captcha_enabled: true,
            bot_sensitivity: 0.5,
            whitelisted_ips: Vec::new(),
            blacklisted_ips: Vec::new(),
            blocked_countries: Vec::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_permissive() {
        let settings = SiteSettings::default();
        assert!(!settings.maintenance_mode);
        assert!(!settings.firewall_active);
        assert!(settings.notification_email.is_none());
        assert!(settings.blacklisted_ips.is_empty());
    }

    #[test]
    fn test_sensitivity_clamped() {
        let mut settings = SiteSettings {
            bot_sensitivity: 3.5,
            ..SiteSettings::default()
        };
        assert!((settings.clamped_sensitivity() - 1.0).abs() < f64::EPSILON);

        settings.bot_sensitivity = -1.0;
        assert!(settings.clamped_sensitivity().abs() < f64::EPSILON);
    }

    #[test]
    fn test_serde_round_trip() {
        let settings = SiteSettings {
            notification_email: Some(Email::parse("sec@ridgeline-hq.dev").unwrap()),
            blacklisted_ips: vec!["203.0.113.9".to_string()],
            ..SiteSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: SiteSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.blacklisted_ips, vec!["203.0.113.9"]);
    }
}
