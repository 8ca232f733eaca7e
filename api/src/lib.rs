//! Homematch safeguards service: fixed-window rate limiting, abuse
//! detection, append-only audit/security logging, and the background job
//! queue. Request handlers across the marketplace consume these modules
//! in-process; the binary in `main.rs` serves the health and internal ops
//! surface with the throttle layer wired in.

use serde::Serialize;
use utoipa::OpenApi;

pub mod abuse;
pub mod audit;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Homematch Safeguards API",
        version = "0.1.0",
        description = "Rate limiting, abuse detection, audit logging, and background job dispatch for the Homematch marketplace."
    ),
    paths(
        routes::health::health_check,
        routes::jobs::pending_jobs,
        routes::jobs::job_status,
    ),
    components(schemas(
        HealthResponse,
        routes::jobs::PendingJobsResponse,
        routes::jobs::JobStatusResponse,
        homematch_core::error::ApiError,
        homematch_core::rate_limit::RateLimitResult,
    ))
)]
pub struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Throttle enforcement mode currently active ("enforce" or "shadow").
    pub enforcement: String,
}
