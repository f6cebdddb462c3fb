//! Ledger service: validation, mutation and reads on top of a [`LedgerStore`].

use std::sync::Arc;

use serde_json::Value;

use crate::error::{LedgerError, Result};
use crate::metrics;
use crate::store::{Applied, InMemoryLedgerStore, LedgerStore};
use crate::types::{Amount, DeviceId, LedgerState, Mutation, RequestId};

/// Applies increments and resets to an injected store.
///
/// Cheap to clone; all clones share the same store.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

impl std::fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService")
            .field("devices", &self.store.device_count())
            .finish()
    }
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Service backed by a fresh [`InMemoryLedgerStore`].
    pub fn in_memory(idempotency_window: usize) -> Self {
        Self::new(Arc::new(InMemoryLedgerStore::new(idempotency_window)))
    }

    /// Add `amount` to the device total.
    pub fn increment(
        &self,
        device_id: &DeviceId,
        amount: Amount,
        request_id: Option<&RequestId>,
    ) -> Result<Applied> {
        self.apply(device_id, Mutation::Increment(amount), request_id)
    }

    /// Set the device total to zero. The version still advances.
    pub fn reset(&self, device_id: &DeviceId, request_id: Option<&RequestId>) -> Result<Applied> {
        self.apply(device_id, Mutation::Reset, request_id)
    }

    /// Validate raw increment input, then apply it.
    ///
    /// Nothing reaches the store unless the device id, the amount and the
    /// optional request id are all valid.
    pub fn increment_raw(
        &self,
        device_id: Option<&str>,
        amount: Option<&Value>,
        request_id: Option<&str>,
    ) -> Result<(DeviceId, Applied)> {
        let parsed = DeviceId::parse_opt(device_id).and_then(|device_id| {
            let amount = Amount::from_json(amount)?;
            let request_id = RequestId::parse_opt(request_id)?;
            Ok((device_id, amount, request_id))
        });
        let (device_id, amount, request_id) = parsed.inspect_err(|err| reject("increment", err))?;

        let applied = self.increment(&device_id, amount, request_id.as_ref())?;
        Ok((device_id, applied))
    }

    /// Validate raw reset input, then apply it.
    pub fn reset_raw(
        &self,
        device_id: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<(DeviceId, Applied)> {
        let parsed = DeviceId::parse_opt(device_id).and_then(|device_id| {
            let request_id = RequestId::parse_opt(request_id)?;
            Ok((device_id, request_id))
        });
        let (device_id, request_id) = parsed.inspect_err(|err| reject("reset", err))?;

        let applied = self.reset(&device_id, request_id.as_ref())?;
        Ok((device_id, applied))
    }

    /// Current `(total, version)` of a device.
    pub fn state(&self, device_id: &DeviceId) -> LedgerState {
        self.store.get(device_id)
    }

    /// Current version of a device.
    pub fn version(&self, device_id: &DeviceId) -> u64 {
        self.store.version(device_id)
    }

    fn apply(
        &self,
        device_id: &DeviceId,
        mutation: Mutation,
        request_id: Option<&RequestId>,
    ) -> Result<Applied> {
        let applied = self
            .store
            .apply(device_id, mutation, request_id)
            .inspect_err(|err| reject(mutation.op(), err))?;

        if applied.replayed {
            metrics::record_replay(mutation.op());
            tracing::info!(
                device_id = %device_id,
                op = mutation.op(),
                request_id = request_id.map(RequestId::as_str),
                version = applied.state.version,
                "replayed mutation for repeated request id"
            );
        } else {
            metrics::record_mutation(mutation.op(), self.store.device_count());
            tracing::debug!(
                device_id = %device_id,
                op = mutation.op(),
                total = applied.state.total,
                version = applied.state.version,
                "applied mutation"
            );
        }

        Ok(applied)
    }
}

fn reject(op: &'static str, err: &LedgerError) {
    metrics::record_rejection(err.kind());
    tracing::debug!(op, error = %err, "rejected mutation");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use serde_json::json;

    /// Store wrapper that counts how often it was contacted.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryLedgerStore,
        calls: AtomicUsize,
    }

    impl LedgerStore for CountingStore {
        fn apply(
            &self,
            device_id: &DeviceId,
            mutation: Mutation,
            request_id: Option<&RequestId>,
        ) -> Result<Applied> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.apply(device_id, mutation, request_id)
        }

        fn get(&self, device_id: &DeviceId) -> LedgerState {
            self.inner.get(device_id)
        }

        fn device_count(&self) -> usize {
            self.inner.device_count()
        }
    }

    fn counting() -> (LedgerService, Arc<CountingStore>) {
        let store = Arc::new(CountingStore::default());
        (LedgerService::new(store.clone()), store)
    }

    fn device(id: &str) -> DeviceId {
        DeviceId::parse(id).unwrap()
    }

    fn state(total: f64, version: u64) -> LedgerState {
        LedgerState { total, version }
    }

    #[test]
    fn scenario_increment_increment_reset_reject() {
        let service = LedgerService::in_memory(0);
        let d1 = device("d1");

        let a = service.increment(&d1, Amount::new(100.0).unwrap(), None).unwrap();
        assert_eq!(a.state, state(100.0, 1));

        let b = service.increment(&d1, Amount::new(50.0).unwrap(), None).unwrap();
        assert_eq!(b.state, state(150.0, 2));

        let c = service.reset(&d1, None).unwrap();
        assert_eq!(c.state, state(0.0, 3));

        let err = service
            .increment_raw(Some("d1"), Some(&json!(-5)), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument { field: "amount", .. }));
        assert_eq!(service.state(&d1), state(0.0, 3));
    }

    #[test]
    fn unknown_device_reads_zero_record() {
        let service = LedgerService::in_memory(0);
        assert_eq!(service.state(&device("unknown-device")), state(0.0, 0));
        assert_eq!(service.version(&device("unknown-device")), 0);
    }

    #[test]
    fn increments_sum_and_count() {
        let service = LedgerService::in_memory(0);
        let d = device("sum");
        let amounts = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        for amount in amounts {
            service.increment(&d, Amount::new(amount).unwrap(), None).unwrap();
        }
        assert_eq!(
            service.state(&d),
            state(amounts.iter().sum(), amounts.len() as u64)
        );
    }

    #[test]
    fn reset_bumps_version_by_one_from_any_total() {
        let service = LedgerService::in_memory(0);
        let d = device("r");
        for prior in [0.0, 1.0, 10_000.0] {
            if prior > 0.0 {
                service.increment(&d, Amount::new(prior).unwrap(), None).unwrap();
            }
            let before = service.version(&d);
            let after = service.reset(&d, None).unwrap().state;
            assert_eq!(after, state(0.0, before + 1));
        }
    }

    #[test]
    fn invalid_increment_never_contacts_store() {
        let (service, store) = counting();
        let bad_amounts = [None, Some(json!(0)), Some(json!(-5)), Some(json!("100")), Some(json!(-0.5))];

        for amount in &bad_amounts {
            let err = service.increment_raw(Some("d1"), amount.as_ref(), None).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidArgument { .. }));
        }
        let err = service.increment_raw(None, Some(&json!(10)), None).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument { field: "deviceId", .. }));

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.state(&device("d1")), state(0.0, 0));
    }

    #[test]
    fn fractional_amounts_are_accepted() {
        let service = LedgerService::in_memory(0);
        let (_, applied) = service
            .increment_raw(Some("d1"), Some(&json!(2.5)), None)
            .unwrap();
        assert_eq!(applied.state, state(2.5, 1));

        let (_, applied) = service
            .increment_raw(Some("d1"), Some(&json!(0.5)), None)
            .unwrap();
        assert_eq!(applied.state, state(3.0, 2));
    }

    #[test]
    fn invalid_reset_never_contacts_store() {
        let (service, store) = counting();
        assert!(service.reset_raw(None, None).is_err());
        assert!(service.reset_raw(Some(" "), None).is_err());
        assert!(service.reset_raw(Some("d1"), Some("")).is_err());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn raw_operations_return_parsed_device() {
        let service = LedgerService::in_memory(0);
        let (d, applied) = service
            .increment_raw(Some("demo-01"), Some(&json!(250)), Some("req-1"))
            .unwrap();
        assert_eq!(d.as_str(), "demo-01");
        assert_eq!(applied.state, state(250.0, 1));

        let (_, applied) = service.reset_raw(Some("demo-01"), None).unwrap();
        assert_eq!(applied.state, state(0.0, 2));
    }

    #[test]
    fn replayed_request_does_not_advance_version() {
        let service = LedgerService::in_memory(8);
        let first = service
            .increment_raw(Some("d1"), Some(&json!(10)), Some("same"))
            .unwrap()
            .1;
        let second = service
            .increment_raw(Some("d1"), Some(&json!(10)), Some("same"))
            .unwrap()
            .1;
        assert!(second.replayed);
        assert_eq!(first.state, second.state);
        assert_eq!(service.version(&device("d1")), 1);
    }

    #[test]
    fn version_matches_full_state() {
        let service = LedgerService::in_memory(0);
        let d = device("v");
        for _ in 0..5 {
            service.increment(&d, Amount::new(7.0).unwrap(), None).unwrap();
            assert_eq!(service.version(&d), service.state(&d).version);
        }
    }
}
