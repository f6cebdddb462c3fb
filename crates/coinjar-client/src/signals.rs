//! Collaborators the session talks to besides the server: the connectivity
//! signal, the human confirmation gate, and the feedback channel.
//!
//! The ledger protocol stays correct when feedback is dropped entirely;
//! [`TracingFeedback`] is enough for headless use.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

// ═══════════════════════════════════════════════════════════════════════════
// Connectivity
// ═══════════════════════════════════════════════════════════════════════════

/// Reports whether the network is believed to be reachable.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity signal for environments without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Shared, externally toggled connectivity flag.
#[derive(Debug, Clone)]
pub struct ConnectivityFlag(Arc<AtomicBool>);

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Confirmation
// ═══════════════════════════════════════════════════════════════════════════

/// Out-of-band human confirmation, asked before destructive actions.
#[async_trait]
pub trait ConfirmGate: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Gate with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl ConfirmGate for AutoConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Feedback
// ═══════════════════════════════════════════════════════════════════════════

/// Tone of the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// An action is in progress.
    Pending,
    Positive,
    Negative,
}

/// One-shot cue accompanying the end of an action (flash/sound vs. shake).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Success,
    Failure,
}

/// The single human-readable status slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub tone: Tone,
}

/// Receives everything the user should see.
///
/// Only [`FeedbackSink::status`] is required; the rest default to no-ops.
pub trait FeedbackSink: Send + Sync {
    fn status(&self, status: &Status);

    fn cue(&self, _cue: Cue) {}

    fn total_changed(&self, _total: f64) {}

    fn busy_changed(&self, _busy: bool) {}
}

/// Feedback sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFeedback;

impl FeedbackSink for TracingFeedback {
    fn status(&self, status: &Status) {
        match status.tone {
            Tone::Negative => tracing::warn!(tone = ?status.tone, "{}", status.message),
            _ => tracing::info!(tone = ?status.tone, "{}", status.message),
        }
    }

    fn total_changed(&self, total: f64) {
        tracing::debug!(total, "displayed total changed");
    }
}
