//! Engine configuration.

use std::time::Duration;

use url::Url;

use taskdock_core::reconcile::PolicyMap;

pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// REST base URL of the dashboard server.
    pub base_url: Url,
    /// Push channel endpoint; derived from `base_url` unless overridden.
    pub ws_url: Url,
    /// Upper bound on a single readiness probe.
    pub probe_timeout: Duration,
    /// Fixed delay between readiness probe attempts.
    pub probe_interval: Duration,
    /// Fixed delay before the push channel reconnects.
    pub reconnect_delay: Duration,
    /// Per-task service policies.
    pub policies: PolicyMap,
}

impl SyncConfig {
    pub fn new(base_url: Url) -> Self {
        let ws_url = derive_ws_url(&base_url);
        Self {
            base_url,
            ws_url,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            probe_interval: Duration::from_millis(DEFAULT_PROBE_INTERVAL_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            policies: PolicyMap::default(),
        }
    }

    pub fn with_policies(mut self, policies: PolicyMap) -> Self {
        self.policies = policies;
        self
    }
}

/// `http://host:port` becomes `ws://host:port/ws` (and https becomes wss).
fn derive_ws_url(base_url: &Url) -> Url {
    let mut ws_url = base_url.clone();
    let scheme = if base_url.scheme() == "https" {
        "wss"
    } else {
        "ws"
    };
    let _ = ws_url.set_scheme(scheme);
    ws_url.set_path("ws");
    ws_url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_is_derived_from_the_base_url() {
        let config = SyncConfig::new(Url::parse("http://127.0.0.1:5041").expect("url"));
        assert_eq!(config.ws_url.as_str(), "ws://127.0.0.1:5041/ws");

        let secure = SyncConfig::new(Url::parse("https://dash.example").expect("url"));
        assert_eq!(secure.ws_url.as_str(), "wss://dash.example/ws");
    }
}
