use axum::Json;
use duet_types::api::HealthResponse;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        service: "duet".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}
