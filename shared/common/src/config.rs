use serde::{Deserialize, Serialize};

/// Connection settings for the hosted backend, loaded once at startup.
///
/// Both the URL and the anon key must be present for the live backend to be
/// selected; if either is missing the application runs against the local
/// mock backend. That fallback is a configuration state, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub http_timeout_secs: u64,
    pub session_poll: SessionPollConfig,
    pub mock_delay_ms: u64,
}

/// Bounded retry-with-backoff applied after sign-up, until the freshly
/// created identity becomes visible on the provider's session endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPollConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("MAQRAA_PROVIDER_URL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            anon_key: std::env::var("MAQRAA_PROVIDER_ANON_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            http_timeout_secs: std::env::var("MAQRAA_HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            session_poll: SessionPollConfig {
                max_attempts: std::env::var("MAQRAA_SESSION_POLL_ATTEMPTS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                base_delay_ms: std::env::var("MAQRAA_SESSION_POLL_BASE_DELAY_MS")
                    .unwrap_or_else(|_| "200".to_string())
                    .parse()
                    .unwrap_or(200),
            },
            mock_delay_ms: std::env::var("MAQRAA_MOCK_DELAY_MS")
                .unwrap_or_else(|_| "800".to_string())
                .parse()
                .unwrap_or(800),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.anon_key.is_some()
    }
}
