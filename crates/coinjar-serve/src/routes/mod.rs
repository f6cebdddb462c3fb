//! API route definitions.

mod device;
mod health;
mod savings;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};

use crate::state::AppState;

pub use self::device::{DeviceQuery, DeviceStateResponse};
pub use self::savings::{IncrementBody, MutationResponse, ResetBody};

/// Build the complete API router.
///
/// # Route Structure
///
/// - `GET /health` - Health check
/// - `POST /api/savings` - Add an amount to a device total
/// - `POST /api/reset` - Reset a device total to zero
/// - `GET /api/device?deviceId=` - Full `{total, version}` state
/// - `GET /api/latest-savings?deviceId=` - Version only, as plain text
pub fn router(state: AppState) -> Router {
    let public = Router::new().route("/health", get(health::health_check));

    let api = Router::new()
        .route("/savings", post(savings::increment))
        .route("/reset", post(savings::reset))
        .route("/device", get(device::get_state))
        .route("/latest-savings", get(device::get_version))
        .layer(middleware::map_response(no_store));

    Router::new()
        .merge(public)
        .nest("/api", api)
        .with_state(state)
}

/// Forbid caching of ledger responses.
///
/// Every read must reflect the authoritative store, so neither browsers nor
/// intermediaries may hold on to a total or a version.
async fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
