//! Latest-snapshot endpoint

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /vehicle/v1/telemetry
/// Return the most recently published snapshot as JSON
pub async fn latest_snapshot(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    if state.cancel.is_cancelled() {
        return Err(ApiError::ServiceUnavailable(
            "Gateway is shutting down".to_string(),
        ));
    }

    let payload = state
        .broadcaster
        .last_payload()
        .ok_or_else(|| ApiError::NotFound("No snapshot published yet".to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        payload.as_str().to_owned(),
    ))
}
