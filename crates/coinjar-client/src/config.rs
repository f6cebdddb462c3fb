//! Client configuration loaded from environment variables.

use std::time::Duration;

use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::session::DEFAULT_REQUEST_TIMEOUT;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the ledger server, without trailing slash.
    pub server_url: String,

    /// Device this client acts for, if configured.
    pub device_id: Option<String>,

    /// Bound on every ledger call.
    pub request_timeout: Duration,

    /// Interval between version polls.
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `COINJAR_SERVER_URL`: Server base URL (default: "http://localhost:3000")
    /// - `COINJAR_DEVICE_ID`: Device identifier (no default)
    /// - `COINJAR_REQUEST_TIMEOUT_MS`: Per-call timeout (default: 10000)
    /// - `COINJAR_POLL_INTERVAL_MS`: Poll interval (default: 2000)
    pub fn from_env() -> anyhow::Result<Self> {
        let server_url = std::env::var("COINJAR_SERVER_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let device_id = std::env::var("COINJAR_DEVICE_ID")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let request_timeout = millis_var("COINJAR_REQUEST_TIMEOUT_MS")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let poll_interval = millis_var("COINJAR_POLL_INTERVAL_MS")?.unwrap_or(DEFAULT_POLL_INTERVAL);

        tracing::debug!(
            server_url = %server_url,
            device_id = ?device_id,
            request_timeout_ms = request_timeout.as_millis() as u64,
            poll_interval_ms = poll_interval.as_millis() as u64,
            "client configuration loaded"
        );

        Ok(Self {
            server_url,
            device_id,
            request_timeout,
            poll_interval,
        })
    }
}

/// Read a positive millisecond duration from the environment.
fn millis_var(key: &str) -> anyhow::Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(raw) => {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{key} must be a number of milliseconds: {e}"))?;
            if ms == 0 {
                anyhow::bail!("{key} must be greater than zero");
            }
            Ok(Some(Duration::from_millis(ms)))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize config tests that manipulate env vars.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "COINJAR_SERVER_URL",
        "COINJAR_DEVICE_ID",
        "COINJAR_REQUEST_TIMEOUT_MS",
        "COINJAR_POLL_INTERVAL_MS",
    ];

    fn with_env_vars<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_MUTEX.lock().unwrap();

        let saved: Vec<_> = ENV_KEYS
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect();

        // SAFETY: Serialized by mutex; only test code touches these vars.
        unsafe {
            for k in ENV_KEYS {
                std::env::remove_var(k);
            }
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
        }

        f();

        // SAFETY: Restoring original env state.
        unsafe {
            for (k, v) in &saved {
                match v {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn config_defaults() {
        with_env_vars(&[], || {
            let config = ClientConfig::from_env().unwrap();
            assert_eq!(config.server_url, "http://localhost:3000");
            assert_eq!(config.device_id, None);
            assert_eq!(config.request_timeout, Duration::from_secs(10));
            assert_eq!(config.poll_interval, Duration::from_secs(2));
        });
    }

    #[test]
    fn config_custom_values() {
        with_env_vars(
            &[
                ("COINJAR_SERVER_URL", "https://jar.example/"),
                ("COINJAR_DEVICE_ID", " demo-01 "),
                ("COINJAR_REQUEST_TIMEOUT_MS", "1500"),
                ("COINJAR_POLL_INTERVAL_MS", "250"),
            ],
            || {
                let config = ClientConfig::from_env().unwrap();
                assert_eq!(config.server_url, "https://jar.example");
                assert_eq!(config.device_id.as_deref(), Some("demo-01"));
                assert_eq!(config.request_timeout, Duration::from_millis(1500));
                assert_eq!(config.poll_interval, Duration::from_millis(250));
            },
        );
    }

    #[test]
    fn config_blank_device_id_is_unset() {
        with_env_vars(&[("COINJAR_DEVICE_ID", "  ")], || {
            assert_eq!(ClientConfig::from_env().unwrap().device_id, None);
        });
    }

    #[test]
    fn config_rejects_bad_durations() {
        with_env_vars(&[("COINJAR_REQUEST_TIMEOUT_MS", "0")], || {
            assert!(ClientConfig::from_env().is_err());
        });
        with_env_vars(&[("COINJAR_POLL_INTERVAL_MS", "soon")], || {
            assert!(ClientConfig::from_env().is_err());
        });
    }
}
