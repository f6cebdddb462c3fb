//! Ledger mutation endpoints.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use coinjar_core::{Applied, DeviceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /api/savings`.
///
/// Fields are loose; malformed values are reported by ledger validation,
/// not by deserialization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementBody {
    pub device_id: Option<String>,
    pub amount: Option<Value>,
    pub request_id: Option<String>,
}

/// Body of `POST /api/reset`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetBody {
    pub device_id: Option<String>,
    pub request_id: Option<String>,
}

/// Result of an accepted mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    pub ok: bool,
    pub device_id: String,
    #[serde(serialize_with = "coinjar_core::serialize_number")]
    pub total: f64,
    pub version: u64,
    /// Present and `true` only when the response was replayed for a repeated
    /// request id.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
}

impl MutationResponse {
    fn new(device_id: DeviceId, applied: Applied) -> Self {
        Self {
            ok: true,
            device_id: device_id.to_string(),
            total: applied.state.total,
            version: applied.state.version,
            replayed: applied.replayed,
        }
    }
}

/// `POST /api/savings`
///
/// Adds `amount` to the device total and advances its version.
pub async fn increment(
    State(state): State<AppState>,
    body: Result<Json<IncrementBody>, JsonRejection>,
) -> Result<Json<MutationResponse>, ApiError> {
    let Json(body) = body?;

    let (device_id, applied) = state.ledger.increment_raw(
        body.device_id.as_deref(),
        body.amount.as_ref(),
        body.request_id.as_deref(),
    )?;

    Ok(Json(MutationResponse::new(device_id, applied)))
}

/// `POST /api/reset`
///
/// Sets the device total to zero. The version still advances, so repeated
/// resets are not no-ops.
pub async fn reset(
    State(state): State<AppState>,
    body: Result<Json<ResetBody>, JsonRejection>,
) -> Result<Json<MutationResponse>, ApiError> {
    let Json(body) = body?;

    let (device_id, applied) = state
        .ledger
        .reset_raw(body.device_id.as_deref(), body.request_id.as_deref())?;

    tracing::info!(device_id = %device_id, version = applied.state.version, "ledger reset");

    Ok(Json(MutationResponse::new(device_id, applied)))
}
