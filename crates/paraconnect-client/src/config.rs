//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start against a
//! local development server with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use paraconnect_shared::constants::{POLL_INTERVAL_MS, STREAM_RETRY_MS};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin of the ParaConnect API.
    /// Env: `PARACONNECT_BASE_URL`
    /// Default: `http://localhost:5050`
    pub base_url: String,

    /// Optional bearer token sent on every request (cookie sessions work
    /// without it).
    /// Env: `PARACONNECT_AUTH_TOKEN`
    pub auth_token: Option<String>,

    /// Fallback polling interval while the event stream is down.
    /// Env: `PARACONNECT_POLL_INTERVAL_MS`
    /// Default: 3000
    pub poll_interval: Duration,

    /// Reconnect delay when the stream drops and the server sent no
    /// `retry:` hint.
    /// Env: `PARACONNECT_STREAM_RETRY_MS`
    /// Default: 3000
    pub stream_retry: Duration,

    /// Timeout for ordinary (non-streaming) requests.
    /// Env: `PARACONNECT_REQUEST_TIMEOUT_SECS`
    /// Default: 30
    pub request_timeout: Duration,

    /// SQLite file backing the attachment queue. `None` uses the platform
    /// data directory.
    /// Env: `PARACONNECT_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Also try the legacy upload routes when the primary one answers
    /// 404/405.
    /// Env: `PARACONNECT_LEGACY_UPLOAD_FALLBACKS` (true/false)
    /// Default: `true`
    pub legacy_upload_fallbacks: bool,

    /// Open the event stream when a case is opened.
    /// Env: `PARACONNECT_REALTIME` (true/false)
    /// Default: `true`
    pub realtime: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5050".to_string(),
            auth_token: None,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            stream_retry: Duration::from_millis(STREAM_RETRY_MS),
            request_timeout: Duration::from_secs(30),
            db_path: None,
            legacy_upload_fallbacks: true,
            realtime: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("PARACONNECT_BASE_URL") {
            let url = url.trim().trim_end_matches('/');
            if url.starts_with("http://") || url.starts_with("https://") {
                config.base_url = url.to_string();
            } else {
                tracing::warn!(value = %url, "Invalid PARACONNECT_BASE_URL, using default");
            }
        }

        if let Some(token) = lookup("PARACONNECT_AUTH_TOKEN") {
            if !token.trim().is_empty() {
                config.auth_token = Some(token.trim().to_string());
            }
        }

        if let Some(ms) = parse_u64(&lookup, "PARACONNECT_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms.max(250));
        }

        if let Some(ms) = parse_u64(&lookup, "PARACONNECT_STREAM_RETRY_MS") {
            config.stream_retry = Duration::from_millis(ms);
        }

        if let Some(secs) = parse_u64(&lookup, "PARACONNECT_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(path) = lookup("PARACONNECT_DB_PATH") {
            if !path.trim().is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("PARACONNECT_LEGACY_UPLOAD_FALLBACKS") {
            config.legacy_upload_fallbacks = val != "false" && val != "0";
        }

        if let Some(val) = lookup("PARACONNECT_REALTIME") {
            config.realtime = val != "false" && val != "0";
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid integer, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> ClientConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert!(config.legacy_upload_fallbacks);
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("PARACONNECT_BASE_URL", "https://app.paraconnect.test/"),
            ("PARACONNECT_POLL_INTERVAL_MS", "5000"),
            ("PARACONNECT_LEGACY_UPLOAD_FALLBACKS", "false"),
            ("PARACONNECT_AUTH_TOKEN", "  "),
        ]);
        assert_eq!(config.base_url, "https://app.paraconnect.test");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert!(!config.legacy_upload_fallbacks);
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PARACONNECT_BASE_URL", "ftp://nope"),
            ("PARACONNECT_POLL_INTERVAL_MS", "soon"),
        ]);
        assert_eq!(config.base_url, "http://localhost:5050");
        assert_eq!(config.poll_interval, Duration::from_millis(POLL_INTERVAL_MS));
    }
}
