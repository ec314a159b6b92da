use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Debounce window used when none is configured (ms).
pub const DEFAULT_DEBOUNCE_MS: u64 = 2_000;

/// Collection path used when none is configured.
pub const DEFAULT_COLLECT_URL: &str = "/clientAjaxStats";

/// Env var holding the bind address of the companion server.
pub const ADDR_ENV: &str = "REQUEST_STATS_ADDR";

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

// ─── Instrumentation ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InstrumentationConfig {
    /// Delay between the first sample of a burst and its flush (ms).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Where batches are POSTed. Relative paths are resolved by the transport.
    #[serde(default = "default_collect_url")]
    pub collect_url: String,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}
fn default_collect_url() -> String {
    DEFAULT_COLLECT_URL.into()
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            collect_url: default_collect_url(),
        }
    }
}

impl InstrumentationConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn with_collect_url(mut self, url: impl Into<String>) -> Self {
        self.collect_url = url.into();
        self
    }
}

// ─── Companion server ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
}

impl ServerConfig {
    /// Reads `REQUEST_STATS_ADDR`, falling back to `0.0.0.0:3000`.
    pub fn from_env() -> Result<Self, std::net::AddrParseError> {
        let raw = std::env::var(ADDR_ENV).unwrap_or_else(|_| DEFAULT_ADDR.into());
        Ok(Self {
            addr: raw.parse()?,
        })
    }
}
