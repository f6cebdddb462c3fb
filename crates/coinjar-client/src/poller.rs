//! Version poller.
//!
//! Mirrors what a constrained device does: read the bare version scalar on a
//! fixed interval and fetch the full state only when it moved. A version
//! lower than the last one seen means the server restarted with an empty
//! store; that is accepted and also triggers a fetch.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use coinjar_core::{DeviceId, LedgerState};
use serde_json::Value;
use tokio::time::MissedTickBehavior;

use crate::error::{SyncError, TransportError};
use crate::session::{DEFAULT_REQUEST_TIMEOUT, parse_total};
use crate::transport::LedgerTransport;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Result of one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The version equals the last one seen; nothing was fetched.
    Unchanged { version: u64 },
    /// The version increased (or this was the first poll) and the full
    /// state was fetched.
    Advanced {
        previous: Option<u64>,
        state: LedgerState,
    },
    /// The version went backwards: the server lost its volatile store.
    Restarted { previous: u64, state: LedgerState },
}

/// Polls the version endpoint of one device.
pub struct VersionPoller {
    device_id: DeviceId,
    transport: Arc<dyn LedgerTransport>,
    interval: Duration,
    request_timeout: Duration,
    last_version: Option<u64>,
    snapshot: Option<LedgerState>,
}

impl VersionPoller {
    pub fn new(device_id: DeviceId, transport: Arc<dyn LedgerTransport>) -> Self {
        Self {
            device_id,
            transport,
            interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            last_version: None,
            snapshot: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Last version seen.
    pub fn last_version(&self) -> Option<u64> {
        self.last_version
    }

    /// Last full state fetched.
    pub fn snapshot(&self) -> Option<LedgerState> {
        self.snapshot
    }

    /// Read the version once and fetch the full state if it changed.
    ///
    /// On error the last known version and snapshot are kept, so the next
    /// poll retries the same comparison.
    pub async fn poll_once(&mut self) -> Result<PollOutcome, SyncError> {
        let raw = self.bounded(self.transport.version(&self.device_id)).await?;
        let version = parse_version(&raw)?;

        let previous = self.last_version;
        match previous {
            Some(last) if version == last => return Ok(PollOutcome::Unchanged { version }),
            _ => {}
        }

        let body = self.bounded(self.transport.state(&self.device_id)).await?;
        let state = parse_state(&body)?;

        // The state may already be ahead of the polled version.
        self.last_version = Some(state.version);
        self.snapshot = Some(state);

        let outcome = match previous {
            Some(last) if version < last => {
                tracing::warn!(
                    device_id = %self.device_id,
                    previous = last,
                    version,
                    "version went backwards, assuming server restart"
                );
                PollOutcome::Restarted {
                    previous: last,
                    state,
                }
            }
            _ => PollOutcome::Advanced { previous, state },
        };

        tracing::debug!(device_id = %self.device_id, ?outcome, "ledger changed");
        Ok(outcome)
    }

    /// Poll until `running` is cleared, calling `on_change` for every poll
    /// that fetched a new state.
    ///
    /// Poll errors are logged and retried on the next tick.
    pub async fn run<F>(&mut self, running: Arc<AtomicBool>, mut on_change: F)
    where
        F: FnMut(&PollOutcome),
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            device_id = %self.device_id,
            interval_ms = self.interval.as_millis() as u64,
            "version poller started"
        );

        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }

            match self.poll_once().await {
                Ok(PollOutcome::Unchanged { .. }) => {}
                Ok(outcome) => on_change(&outcome),
                Err(e) => {
                    tracing::warn!(device_id = %self.device_id, error = %e, "poll failed");
                }
            }
        }

        tracing::info!(device_id = %self.device_id, "version poller stopped");
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, SyncError> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(TransportError::TimedOut(self.request_timeout).into()),
        }
    }
}

/// Parse the bare version scalar.
fn parse_version(raw: &str) -> Result<u64, SyncError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SyncError::MalformedResponse(format!(
            "expected a decimal version, got {raw:?}"
        )));
    }
    trimmed
        .parse()
        .map_err(|e| SyncError::MalformedResponse(format!("version out of range: {e}")))
}

/// Parse a full-state body; both fields are required.
fn parse_state(body: &Value) -> Result<LedgerState, SyncError> {
    let version = body
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| SyncError::MalformedResponse(format!("no numeric version in {body}")))?;
    Ok(LedgerState {
        total: parse_total(body)?,
        version,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::session::tests::{FakeTransport, Reply};

    fn scripted_poller(replies: Vec<Reply>) -> (VersionPoller, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::scripted(replies));
        let poller = VersionPoller::new(DeviceId::parse("esp32").unwrap(), transport.clone());
        (poller, transport)
    }

    fn state(total: f64, version: u64) -> Reply {
        Reply::Json(json!({"deviceId": "esp32", "total": total, "version": version}))
    }

    #[tokio::test]
    async fn first_poll_fetches_state() {
        let (mut poller, transport) = scripted_poller(vec![Reply::Text("0"), state(0.0, 0)]);
        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Advanced {
                previous: None,
                state: LedgerState { total: 0.0, version: 0 }
            }
        );
        assert_eq!(transport.calls(), 2);
        assert_eq!(poller.last_version(), Some(0));
    }

    #[tokio::test]
    async fn unchanged_version_skips_full_fetch() {
        let (mut poller, transport) = scripted_poller(vec![
            Reply::Text("3"),
            state(150.0, 3),
            Reply::Text("3\n"),
            Reply::Text("3"),
        ]);
        poller.poll_once().await.unwrap();
        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Unchanged { version: 3 });
        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Unchanged { version: 3 });
        assert_eq!(transport.calls(), 4);
        assert_eq!(poller.snapshot(), Some(LedgerState { total: 150.0, version: 3 }));
    }

    #[tokio::test]
    async fn advanced_version_fetches_state() {
        let (mut poller, _) = scripted_poller(vec![Reply::Text("1"), state(100.0, 1), Reply::Text("2"), state(150.0, 2)]);
        poller.poll_once().await.unwrap();
        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Advanced {
                previous: Some(1),
                state: LedgerState { total: 150.0, version: 2 }
            }
        );
        assert_eq!(poller.last_version(), Some(2));
    }

    #[tokio::test]
    async fn lower_version_is_a_restart() {
        let (mut poller, _) = scripted_poller(vec![Reply::Text("7"), state(70.0, 7), Reply::Text("1"), state(5.0, 1)]);
        poller.poll_once().await.unwrap();
        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Restarted {
                previous: 7,
                state: LedgerState { total: 5.0, version: 1 }
            }
        );
        assert_eq!(poller.last_version(), Some(1));
    }

    #[tokio::test]
    async fn errors_keep_last_known_state() {
        let (mut poller, _) = scripted_poller(vec![
            Reply::Text("2"),
            state(20.0, 2),
            Reply::Text("{\"version\":3}"),
            Reply::Fail,
            Reply::Text("3"),
            Reply::Json(json!({"total": 30})),
        ]);
        poller.poll_once().await.unwrap();

        let err = poller.poll_once().await.unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse(_)));
        let err = poller.poll_once().await.unwrap_err();
        assert!(matches!(err, SyncError::TransportFailure(_)));
        let err = poller.poll_once().await.unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse(_)));

        assert_eq!(poller.last_version(), Some(2));
        assert_eq!(poller.snapshot(), Some(LedgerState { total: 20.0, version: 2 }));
    }

    #[tokio::test]
    async fn fractional_totals_are_read() {
        let (mut poller, _) = scripted_poller(vec![Reply::Text("4"), state(12.75, 4)]);
        poller.poll_once().await.unwrap();
        assert_eq!(poller.snapshot(), Some(LedgerState { total: 12.75, version: 4 }));
    }

    #[test]
    fn parse_version_accepts_only_digits() {
        assert_eq!(parse_version("42").unwrap(), 42);
        assert_eq!(parse_version(" 42\r\n").unwrap(), 42);
        for bad in ["", "-1", "4.2", "0x10", "99999999999999999999999"] {
            assert!(parse_version(bad).is_err(), "{bad}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_reports_changes_until_stopped() {
        let (poller, _) = scripted_poller(vec![
            Reply::Text("1"),
            state(10.0, 1),
            Reply::Text("1"),
            Reply::Fail,
            Reply::Text("2"),
            state(30.0, 2),
        ]);
        let mut poller = poller.with_interval(Duration::from_millis(500));
        let running = Arc::new(AtomicBool::new(true));
        let stop = Arc::clone(&running);

        let mut seen = Vec::new();
        poller
            .run(running, |outcome| {
                seen.push(outcome.clone());
                if let PollOutcome::Advanced { state, .. } = outcome {
                    if state.version == 2 {
                        stop.store(false, Ordering::SeqCst);
                    }
                }
            })
            .await;

        assert_eq!(seen.len(), 2);
        assert_eq!(poller.snapshot(), Some(LedgerState { total: 30.0, version: 2 }));
    }
}
