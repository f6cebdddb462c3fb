//! Coinjar Serve - HTTP API for the device ledger
//!
//! This crate exposes the authoritative per-device ledger over HTTP. Two
//! kinds of consumers use it: an interactive client that mutates the ledger
//! and reconciles its optimistic display with the returned state, and small
//! embedded pollers that only read the version scalar.
//!
//! # Architecture
//!
//! - **AppState**: Shared application state (ledger service, configuration)
//! - **Routes**: Mutation and read endpoints under `/api`, plus `/health`
//! - **ApiError**: Ledger errors mapped to JSON error responses

mod config;
mod error;
mod routes;
mod state;

pub use self::config::Config;
pub use self::error::ApiError;
pub use self::routes::{
    DeviceQuery, DeviceStateResponse, IncrementBody, MutationResponse, ResetBody, router,
};
pub use self::state::AppState;
