//! Server configuration loaded from environment variables.

use coinjar_core::DEFAULT_IDEMPOTENCY_WINDOW;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:3000").
    pub bind_addr: String,

    /// Number of request ids remembered per device for replay detection.
    /// `0` disables replay detection.
    pub idempotency_window: usize,

    /// Port for the Prometheus `/metrics` endpoint. Disabled when unset.
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            idempotency_window: DEFAULT_IDEMPOTENCY_WINDOW,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `COINJAR_BIND_ADDR`: Server bind address (default: "0.0.0.0:3000")
    /// - `COINJAR_IDEMPOTENCY_WINDOW`: Request ids remembered per device (default: 64)
    /// - `COINJAR_METRICS_PORT`: Port for the Prometheus exporter (default: disabled)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let bind_addr = std::env::var("COINJAR_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let idempotency_window = match std::env::var("COINJAR_IDEMPOTENCY_WINDOW") {
            Ok(raw) => raw.trim().parse::<usize>().map_err(|e| {
                anyhow::anyhow!("COINJAR_IDEMPOTENCY_WINDOW must be a non-negative integer: {e}")
            })?,
            Err(_) => defaults.idempotency_window,
        };

        let metrics_port = match std::env::var("COINJAR_METRICS_PORT") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse::<u16>()
                    .map_err(|e| anyhow::anyhow!("COINJAR_METRICS_PORT must be a port number: {e}"))?,
            ),
            _ => None,
        };

        tracing::info!(
            bind_addr = %bind_addr,
            idempotency_window,
            metrics_port = ?metrics_port,
            "configuration loaded"
        );

        Ok(Self {
            bind_addr,
            idempotency_window,
            metrics_port,
        })
    }
}
