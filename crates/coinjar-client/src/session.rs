//! Optimistic sync session.
//!
//! A [`SyncSession`] holds the displayed total for one device and runs the
//! three user actions against the ledger:
//!
//! - [`SyncSession::increment`] shows `previous + amount` immediately, then
//!   adopts the server total or restores `previous`.
//! - [`SyncSession::reset`] asks for confirmation, then behaves like an
//!   increment whose speculation is "unchanged until confirmed".
//! - [`SyncSession::refresh`] reads the full state; nothing to roll back.
//!
//! # Single flight
//!
//! Each action goes `Idle → Busy → (Reconciled | RolledBack) → Idle`. While
//! Busy, any further action returns [`ActionOutcome::Ignored`] without side
//! effects; nothing is queued. The busy flag is released by a guard, so every
//! exit path (success, failure, timeout, a dropped future) returns to Idle.
//! A dropped increment also puts the previous total back on display.
//!
//! Every network call is bounded by the session's request timeout; a call
//! that never answers is reported as a transport failure.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use coinjar_core::{Amount, DeviceId, LedgerError};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{SyncError, TransportError};
use crate::signals::{
    AlwaysOnline, AutoConfirm, ConfirmGate, Connectivity, Cue, FeedbackSink, Status, Tone,
    TracingFeedback,
};
use crate::transport::LedgerTransport;

/// Default bound on a single ledger call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Prompt shown by the confirmation gate before a reset.
pub const RESET_PROMPT: &str = "Really reset the total to zero?";

/// What a user action ended up doing.
#[derive(Debug)]
pub enum ActionOutcome {
    /// Another action was in flight; this one had no effect.
    Ignored,
    /// Refused locally (offline or invalid input); nothing was sent.
    Rejected(SyncError),
    /// The user declined the confirmation; nothing was sent.
    Declined,
    /// The server answered and its total is now displayed.
    Reconciled { total: f64, version: Option<u64> },
    /// The mutation failed and the speculative total was undone.
    RolledBack { restored: f64, error: SyncError },
    /// A read failed; the display was left as it was.
    Failed(SyncError),
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Reconciled { .. })
    }

    /// The error behind a failed or rejected action.
    pub fn error(&self) -> Option<&SyncError> {
        match self {
            Self::Rejected(error) | Self::Failed(error) | Self::RolledBack { error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct View {
    total: f64,
    version: Option<u64>,
    status: Option<Status>,
}

/// Holds the busy flag for one action.
///
/// Dropping it releases the flag. If the action is dropped while a
/// speculative total is on display, the previous total is restored first.
struct BusyGuard<'a> {
    session: &'a SyncSession,
    restore: Option<f64>,
}

impl BusyGuard<'_> {
    /// Display `shown` until the action settles, remembering `previous`.
    fn speculate(&mut self, previous: f64, shown: f64) {
        self.restore = Some(previous);
        self.session.set_total(shown);
    }

    /// The action reached a final state; nothing to undo on drop.
    fn settle(&mut self) {
        self.restore = None;
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.restore.take() {
            tracing::debug!(
                device_id = %self.session.device_id,
                previous,
                "action cancelled, restoring total"
            );
            self.session.set_total(previous);
            self.session.set_status("Cancelled.", Tone::Negative);
        }
        self.session.busy.store(false, Ordering::Release);
        self.session.feedback.busy_changed(false);
    }
}

/// Client-side session for one device.
pub struct SyncSession {
    device_id: DeviceId,
    transport: Arc<dyn LedgerTransport>,
    connectivity: Arc<dyn Connectivity>,
    confirm: Arc<dyn ConfirmGate>,
    feedback: Arc<dyn FeedbackSink>,
    request_timeout: Duration,
    busy: AtomicBool,
    view: Mutex<View>,
}

impl SyncSession {
    /// Create a session that is always online, confirms resets automatically
    /// and reports feedback through tracing.
    pub fn new(device_id: DeviceId, transport: Arc<dyn LedgerTransport>) -> Self {
        Self {
            device_id,
            transport,
            connectivity: Arc::new(AlwaysOnline),
            confirm: Arc::new(AutoConfirm(true)),
            feedback: Arc::new(TracingFeedback),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            busy: AtomicBool::new(false),
            view: Mutex::new(View::default()),
        }
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_confirm_gate(mut self, confirm: Arc<dyn ConfirmGate>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// The currently displayed total (possibly speculative while Busy).
    pub fn total(&self) -> f64 {
        self.view.lock().total
    }

    /// Last version reported by the server, if any.
    pub fn version(&self) -> Option<u64> {
        self.view.lock().version
    }

    /// The current status line.
    pub fn status(&self) -> Option<Status> {
        self.view.lock().status.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Actions
    // ─────────────────────────────────────────────────────────────────────

    /// Add `amount` to the ledger, showing the result before the server
    /// confirms it.
    pub async fn increment(&self, amount: f64) -> ActionOutcome {
        if self.is_busy() {
            tracing::debug!(device_id = %self.device_id, "increment ignored: busy");
            return ActionOutcome::Ignored;
        }
        if let Err(error) = self.ensure_online() {
            return ActionOutcome::Rejected(error);
        }
        let amount = match Amount::new(amount) {
            Ok(amount) => amount,
            Err(err) => {
                let error = SyncError::InvalidArgument(invalid_reason(err));
                self.finish_failure(format!("Enter a valid amount: {error}"));
                return ActionOutcome::Rejected(error);
            }
        };
        let Some(mut guard) = self.try_begin() else {
            return ActionOutcome::Ignored;
        };

        self.set_status("Sending…", Tone::Pending);
        let previous = self.total();
        guard.speculate(previous, previous + amount.get());

        let request_id = Uuid::new_v4().to_string();
        let result = self
            .call(self.transport.increment(&self.device_id, amount, &request_id))
            .await;

        guard.settle();
        match result.and_then(|body| parse_mutation(&body)) {
            Ok((total, version)) => {
                self.adopt(total, version);
                self.finish_success(format!("+{amount} added."));
                ActionOutcome::Reconciled { total, version }
            }
            Err(error) => {
                self.set_total(previous);
                self.finish_failure(format!("Send failed: {error}"));
                tracing::warn!(device_id = %self.device_id, %amount, error = %error, "increment rolled back");
                ActionOutcome::RolledBack {
                    restored: previous,
                    error,
                }
            }
        }
    }

    /// Reset the ledger to zero after the confirmation gate agrees.
    pub async fn reset(&self) -> ActionOutcome {
        if self.is_busy() {
            tracing::debug!(device_id = %self.device_id, "reset ignored: busy");
            return ActionOutcome::Ignored;
        }
        if let Err(error) = self.ensure_online() {
            return ActionOutcome::Rejected(error);
        }
        if !self.confirm.confirm(RESET_PROMPT).await {
            tracing::debug!(device_id = %self.device_id, "reset declined");
            return ActionOutcome::Declined;
        }
        let Some(_guard) = self.try_begin() else {
            return ActionOutcome::Ignored;
        };

        self.set_status("Resetting…", Tone::Pending);
        let previous = self.total();

        let request_id = Uuid::new_v4().to_string();
        let result = self
            .call(self.transport.reset(&self.device_id, &request_id))
            .await;

        match result.and_then(|body| parse_mutation(&body)) {
            Ok((total, version)) => {
                self.adopt(total, version);
                self.finish_success("Reset.".to_string());
                ActionOutcome::Reconciled { total, version }
            }
            Err(error) => {
                self.set_total(previous);
                self.finish_failure(format!("Reset failed: {error}"));
                tracing::warn!(device_id = %self.device_id, error = %error, "reset rolled back");
                ActionOutcome::RolledBack {
                    restored: previous,
                    error,
                }
            }
        }
    }

    /// Replace the displayed total with the server's.
    pub async fn refresh(&self) -> ActionOutcome {
        if self.is_busy() {
            return ActionOutcome::Ignored;
        }
        if let Err(error) = self.ensure_online() {
            return ActionOutcome::Rejected(error);
        }
        let Some(_guard) = self.try_begin() else {
            return ActionOutcome::Ignored;
        };

        self.set_status("Loading…", Tone::Pending);

        let result = self.call(self.transport.state(&self.device_id)).await;

        match result.and_then(|body| parse_mutation(&body)) {
            Ok((total, version)) => {
                self.adopt(total, version);
                self.finish_success("Updated.".to_string());
                ActionOutcome::Reconciled { total, version }
            }
            Err(error) => {
                self.finish_failure(format!("Load failed: {error}"));
                ActionOutcome::Failed(error)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn ensure_online(&self) -> Result<(), SyncError> {
        if self.connectivity.is_online() {
            return Ok(());
        }
        tracing::debug!(device_id = %self.device_id, "offline, action refused");
        self.finish_failure("Offline: cannot reach the ledger.".to_string());
        Err(SyncError::Unreachable)
    }

    fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.feedback.busy_changed(true);
        Some(BusyGuard {
            session: self,
            restore: None,
        })
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(TransportError::TimedOut(self.request_timeout).into()),
        }
    }

    fn set_total(&self, total: f64) {
        self.view.lock().total = total;
        self.feedback.total_changed(total);
    }

    fn adopt(&self, total: f64, version: Option<u64>) {
        {
            let mut view = self.view.lock();
            view.total = total;
            if version.is_some() {
                view.version = version;
            }
        }
        self.feedback.total_changed(total);
    }

    fn set_status(&self, message: impl Into<String>, tone: Tone) {
        let status = Status {
            message: message.into(),
            tone,
        };
        self.feedback.status(&status);
        self.view.lock().status = Some(status);
    }

    fn finish_success(&self, message: String) {
        self.set_status(message, Tone::Positive);
        self.feedback.cue(Cue::Success);
    }

    fn finish_failure(&self, message: String) {
        self.set_status(message, Tone::Negative);
        self.feedback.cue(Cue::Failure);
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let view = self.view.lock();
        f.debug_struct("SyncSession")
            .field("device_id", &self.device_id)
            .field("busy", &self.is_busy())
            .field("total", &view.total)
            .field("version", &view.version)
            .finish()
    }
}

fn invalid_reason(err: LedgerError) -> String {
    match err {
        LedgerError::InvalidArgument { reason, .. } => reason,
        other => other.to_string(),
    }
}

/// Extract `(total, version)` from a ledger response body.
///
/// `total` must be a non-negative number; `version` is optional.
pub(crate) fn parse_mutation(body: &Value) -> Result<(f64, Option<u64>), SyncError> {
    let total = parse_total(body)?;
    let version = body.get("version").and_then(Value::as_u64);
    Ok((total, version))
}

/// Read a non-negative numeric `total` field.
pub(crate) fn parse_total(body: &Value) -> Result<f64, SyncError> {
    body.get("total")
        .and_then(Value::as_f64)
        .filter(|total| total.is_finite() && *total >= 0.0)
        .ok_or_else(|| SyncError::MalformedResponse(format!("no numeric total in {body}")))
}
