//! Core types, storage and service for the coinjar device ledger.
//!
//! Each physical device owns a ledger record: a running monetary `total`
//! and a `version` that advances by one on every successful mutation. This crate provides:
//! - Validated input types ([`DeviceId`], [`Amount`], [`RequestId`])
//! - The [`LedgerStore`] trait and its volatile [`InMemoryLedgerStore`]
//! - [`LedgerService`], which validates and applies increments and resets
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
pub mod metrics;
mod service;
mod store;
mod types;

pub use error::{LedgerError, Result};
pub use service::LedgerService;
pub use store::{Applied, DEFAULT_IDEMPOTENCY_WINDOW, InMemoryLedgerStore, LedgerStore};
pub use types::{
    Amount, DeviceId, LedgerState, MAX_DEVICE_ID_LEN, MAX_REQUEST_ID_LEN, Mutation, RequestId,
    serialize_number,
};
