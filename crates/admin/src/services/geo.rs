//! Geolocation lookup with a hard time budget and a sentinel fallback.
//!
//! Geolocation failure must never block event emission: every failure
//! mode (non-200, timeout, malformed body) collapses into the sentinel
//! `{ip: "0.0.0.0", country: "Unknown"}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A resolved caller location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    /// Caller IP as seen by the upstream service.
    pub ip: String,
    /// Caller country, human-readable.
    pub country: String,
}

impl GeoInfo {
    /// The sentinel returned when lookup fails or times out.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            country: "Unknown".to_string(),
        }
    }
}

/// A geolocation source. Infallible by contract: implementations absorb
/// their own failures into [`GeoInfo::unknown`].
#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// Resolve the caller's location, or the sentinel.
    async fn lookup(&self) -> GeoInfo;
}

/// Upstream response shape (ip-api.com with `fields=query,country`).
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// [`GeoLookup`] backed by the ip-api.com JSON endpoint.
pub struct IpApiLookup {
    client: reqwest::Client,
    endpoint: String,
    budget: Duration,
}

impl IpApiLookup {
    /// Create a lookup client with the given endpoint and time budget.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be constructed.
    pub fn new(endpoint: &str, budget: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(budget)
            .user_agent("ridgeline-admin/0.1")
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            budget,
        })
    }

    async fn fetch(&self) -> Option<GeoInfo> {
        let response = self.client.get(&self.endpoint).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: IpApiResponse = response.json().await.ok()?;

        Some(GeoInfo {
            ip: body.query.unwrap_or_else(|| "0.0.0.0".to_string()),
            country: body.country.unwrap_or_else(|| "Unknown".to_string()),
        })
    }
}

#[async_trait]
impl GeoLookup for IpApiLookup {
    async fn lookup(&self) -> GeoInfo {
        // The client carries its own timeout; the outer budget also bounds
        // connection setup on platforms where the former does not apply.
        let result = tokio::time::timeout(self.budget, self.fetch()).await;

        match result {
            Ok(Some(info)) => info,
            Ok(None) => {
                tracing::debug!("geolocation lookup failed, using sentinel");
                GeoInfo::unknown()
            }
            Err(_) => {
                tracing::debug!(budget_ms = %self.budget.as_millis(), "geolocation lookup timed out");
                GeoInfo::unknown()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_shape() {
        let sentinel = GeoInfo::unknown();
        assert_eq!(sentinel.ip, "0.0.0.0");
        assert_eq!(sentinel.country, "Unknown");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_resolves_to_sentinel() {
        // Port 1 on loopback refuses connections immediately.
        let lookup =
            IpApiLookup::new("http://127.0.0.1:1/json/", Duration::from_millis(500)).unwrap();

        let info = lookup.lookup().await;
        assert_eq!(info, GeoInfo::unknown());
    }

    #[tokio::test]
    async fn test_lookup_respects_time_budget() {
        // A non-routable address hangs the connect; the budget caps it.
        let lookup =
            IpApiLookup::new("http://10.255.255.1:81/json/", Duration::from_millis(200)).unwrap();

        let start = std::time::Instant::now();
        let info = lookup.lookup().await;
        assert_eq!(info, GeoInfo::unknown());
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
