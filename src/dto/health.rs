use serde::Serialize;
use utoipa::ToSchema;

/// Payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" while the timer store answers pings, "degraded" otherwise.
    pub status: String,
}

impl HealthResponse {
    /// The timer store is reachable; the API is fully functional.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    /// The timer store is offline; timer endpoints refuse work until it
    /// comes back.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
        }
    }
}
