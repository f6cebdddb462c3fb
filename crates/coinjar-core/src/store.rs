//! Ledger storage.
//!
//! The store owns the mapping from [`DeviceId`] to its ledger record and is
//! the single authority for `(total, version)`. It is injected into
//! [`LedgerService`](crate::LedgerService) as an `Arc<dyn LedgerStore>`, so
//! tests can wrap or replace it.
//!
//! # Atomicity
//!
//! [`LedgerStore::apply`] performs the replay check, the arithmetic and the
//! write under one lock. Two concurrent requests for the same device are
//! therefore applied one after the other in lock-acquisition order and never
//! lose an increment.
//!
//! # Request ids
//!
//! When a mutation carries a [`RequestId`], the record remembers the result
//! of the last `window` identified mutations. Resending the same id with the
//! same mutation returns the remembered result without touching the record.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use crate::error::{LedgerError, Result};
use crate::types::{DeviceId, LedgerState, Mutation, RequestId};

/// Default number of remembered request ids per device.
pub const DEFAULT_IDEMPOTENCY_WINDOW: usize = 64;

/// Outcome of a mutation accepted by the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Applied {
    /// Device state after the mutation.
    pub state: LedgerState,
    /// `true` when the result was replayed for a repeated request id.
    pub replayed: bool,
}

/// Storage backend for device ledger records.
pub trait LedgerStore: Send + Sync {
    /// Atomically apply a mutation to a device record.
    ///
    /// Creates the record on first mutation. On error the record is left
    /// untouched.
    fn apply(
        &self,
        device_id: &DeviceId,
        mutation: Mutation,
        request_id: Option<&RequestId>,
    ) -> Result<Applied>;

    /// Current state of a device; the zero record for an unseen device.
    fn get(&self, device_id: &DeviceId) -> LedgerState;

    /// Current version of a device; `0` for an unseen device.
    fn version(&self, device_id: &DeviceId) -> u64 {
        self.get(device_id).version
    }

    /// Number of devices with at least one applied mutation.
    fn device_count(&self) -> usize;
}

#[derive(Debug, Clone)]
struct Receipt {
    request_id: RequestId,
    mutation: Mutation,
    state: LedgerState,
}

#[derive(Debug, Default)]
struct DeviceRecord {
    state: LedgerState,
    recent: VecDeque<Receipt>,
}

impl DeviceRecord {
    fn find_receipt(&self, request_id: &RequestId) -> Option<&Receipt> {
        self.recent.iter().find(|r| &r.request_id == request_id)
    }
}

/// Volatile, process-local ledger store.
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    records: RwLock<HashMap<DeviceId, DeviceRecord>>,
    idempotency_window: usize,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new(DEFAULT_IDEMPOTENCY_WINDOW)
    }
}

impl InMemoryLedgerStore {
    /// Create an empty store remembering `idempotency_window` request ids per
    /// device. A window of `0` disables replay detection.
    pub fn new(idempotency_window: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            idempotency_window,
        }
    }

    pub fn idempotency_window(&self) -> usize {
        self.idempotency_window
    }
}

/// Compute the state that results from applying `mutation` to `current`.
fn next_state(device_id: &DeviceId, current: LedgerState, mutation: Mutation) -> Result<LedgerState> {
    let overflow = || LedgerError::Overflow {
        device_id: device_id.to_string(),
    };

    let total = match mutation {
        Mutation::Increment(amount) => {
            let total = current.total + amount.get();
            if !total.is_finite() {
                return Err(overflow());
            }
            total
        }
        Mutation::Reset => 0.0,
    };
    let version = current.version.checked_add(1).ok_or_else(overflow)?;

    Ok(LedgerState { total, version })
}

impl LedgerStore for InMemoryLedgerStore {
    fn apply(
        &self,
        device_id: &DeviceId,
        mutation: Mutation,
        request_id: Option<&RequestId>,
    ) -> Result<Applied> {
        let mut records = self.records.write();

        let current = match records.get(device_id) {
            Some(record) => {
                if let Some(receipt) = request_id.and_then(|id| record.find_receipt(id)) {
                    if receipt.mutation != mutation {
                        return Err(LedgerError::RequestIdConflict {
                            request_id: receipt.request_id.to_string(),
                        });
                    }
                    return Ok(Applied {
                        state: receipt.state,
                        replayed: true,
                    });
                }
                record.state
            }
            None => LedgerState::default(),
        };

        let next = next_state(device_id, current, mutation)?;

        let record = records.entry(device_id.clone()).or_default();
        record.state = next;

        if let Some(request_id) = request_id {
            if self.idempotency_window > 0 {
                record.recent.push_back(Receipt {
                    request_id: request_id.clone(),
                    mutation,
                    state: next,
                });
                while record.recent.len() > self.idempotency_window {
                    record.recent.pop_front();
                }
            }
        }

        Ok(Applied {
            state: next,
            replayed: false,
        })
    }

    fn get(&self, device_id: &DeviceId) -> LedgerState {
        self.records
            .read()
            .get(device_id)
            .map(|record| record.state)
            .unwrap_or_default()
    }

    fn device_count(&self) -> usize {
        self.records.read().len()
    }
}
