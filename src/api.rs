use crate::server::{AppState, host_from_headers};
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde_json::json;

/// Debug view of the consent configuration the server injects with.
pub async fn get_consent_config(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let host = host_from_headers(&headers);
    match &state.consent {
        Some(consent) => Json(json!({
            "configured": true,
            "host": host,
            "webBase": state.config.web_base,
            "config": consent.as_ref(),
        })),
        None => Json(json!({
            "configured": false,
            "host": host,
        })),
    }
}
