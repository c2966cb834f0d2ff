//! Client configuration.
//!
//! There are no process-wide defaults: the composition root builds a
//! `ClientConfig` (or deserializes one with any serde format) and hands it
//! to the client. Absent fields fall back to `ClientConfig::default()`.

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4242;
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Raw query-string fragment sent first on every request, e.g. `details`
    /// or `summary`. Empty means none.
    pub response_type: String,
    /// Sent as `tz=<timezone>` on every request.
    pub timezone: String,
    /// Emit one `tracing` debug event per completed call.
    pub log_requests: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            response_type: String::new(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            log_requests: true,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_response_type(mut self, response_type: impl Into<String>) -> Self {
        self.response_type = response_type.into();
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_log_requests(mut self, log_requests: bool) -> Self {
        self.log_requests = log_requests;
        self
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
