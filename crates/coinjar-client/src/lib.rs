//! Coinjar Client - optimistic sync client and version poller.
//!
//! # Architecture
//!
//! - **SyncSession**: Interactive client logic. Shows mutations before the
//!   server confirms them, reconciles with the server's answer, rolls back
//!   on failure, and allows a single action in flight.
//! - **VersionPoller**: Passive consumer that polls the version scalar and
//!   only fetches the full state when it changed.
//! - **LedgerTransport**: The network seam; [`HttpTransport`] speaks to
//!   `coinjar-serve`, tests substitute their own.
//! - **Signals**: Connectivity, confirmation and feedback collaborators.

mod config;
mod error;
mod poller;
mod session;
mod signals;
mod transport;

pub use self::config::ClientConfig;
pub use self::error::{SyncError, TransportError};
pub use self::poller::{DEFAULT_POLL_INTERVAL, PollOutcome, VersionPoller};
pub use self::session::{ActionOutcome, DEFAULT_REQUEST_TIMEOUT, RESET_PROMPT, SyncSession};
pub use self::signals::{
    AlwaysOnline, AutoConfirm, ConfirmGate, Connectivity, ConnectivityFlag, Cue, FeedbackSink,
    Status, Tone, TracingFeedback,
};
pub use self::transport::{HttpTransport, LedgerTransport};
