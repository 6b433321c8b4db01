pub(crate) mod accounts;
pub(crate) mod bottles;

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "cellar-api",
    })
}
