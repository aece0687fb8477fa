use axum::{Json, extract::State};

use lockbox_types::api::HealthResponse;

use crate::auth::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let crypto = &state.crypto;
    Json(HealthResponse {
        status: if crypto.is_degraded() { "degraded" } else { "ok" }.to_string(),
        crypto_mode: crypto.mode().to_string(),
        degraded: crypto.is_degraded(),
        kem: crypto.kem_algorithm().to_string(),
        signature: crypto.signature_algorithm().to_string(),
    })
}
