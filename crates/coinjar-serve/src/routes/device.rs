//! Read-only ledger endpoints.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use coinjar_core::DeviceId;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters shared by the read endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceQuery {
    pub device_id: Option<String>,
}

/// Full ledger state of one device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStateResponse {
    pub device_id: String,
    #[serde(serialize_with = "coinjar_core::serialize_number")]
    pub total: f64,
    pub version: u64,
}

/// `GET /api/device?deviceId=...`
///
/// Returns `{deviceId, total, version}`; an unseen device reads as zero.
pub async fn get_state(
    State(state): State<AppState>,
    Query(params): Query<DeviceQuery>,
) -> Result<Json<DeviceStateResponse>, ApiError> {
    let device_id = DeviceId::parse_opt(params.device_id.as_deref())?;
    let ledger = state.ledger.state(&device_id);

    Ok(Json(DeviceStateResponse {
        device_id: device_id.to_string(),
        total: ledger.total,
        version: ledger.version,
    }))
}

/// `GET /api/latest-savings?deviceId=...`
///
/// Returns the version as bare decimal digits in `text/plain`, for pollers
/// that cannot afford a JSON parser.
pub async fn get_version(
    State(state): State<AppState>,
    Query(params): Query<DeviceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let device_id = DeviceId::parse_opt(params.device_id.as_deref())?;
    let version = state.ledger.version(&device_id);

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        version.to_string(),
    ))
}
