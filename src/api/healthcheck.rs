use serde::Serialize;

use super::response::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
}

/// Liveness probe; never touches the store.
pub async fn healthcheck() -> ApiResult<ApiResponse<HealthStatus>> {
    Ok(ApiResponse::ok(HealthStatus { status: "OK" }, "Service is healthy"))
}
