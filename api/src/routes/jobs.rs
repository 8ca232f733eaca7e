//! Internal operations surface for the background queue: queue depth and
//! per-job status lookups. Mounted under /internal and expected to be
//! reachable only from the private network.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use homematch_core::jobs::{Job, JobQueue, JobStatus};

use crate::error::AppError;
use crate::jobs::{get_pending_jobs_count, try_get_job};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/internal/jobs/pending", get(pending_jobs))
        .route("/internal/jobs/{job_id}", get(job_status))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PendingJobsResponse {
    /// Due, pending jobs per queue. Every queue is present, zeroed when
    /// idle.
    pub pending: BTreeMap<JobQueue, i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub queue: JobQueue,
    pub job_type: String,
    pub status: JobStatus,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub scheduled_for: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            queue: job.queue,
            job_type: job.job_type,
            status: job.status,
            priority: job.priority,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            scheduled_for: job.scheduled_for,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_message: job.error_message,
            created_at: job.created_at,
        }
    }
}

/// Queue depth snapshot for dashboards and worker autoscaling.
#[utoipa::path(
    get,
    path = "/internal/jobs/pending",
    responses(
        (status = 200, description = "Pending job counts per queue", body = PendingJobsResponse)
    ),
    tag = "internal"
)]
pub async fn pending_jobs(State(state): State<AppState>) -> Json<PendingJobsResponse> {
    Json(PendingJobsResponse {
        pending: get_pending_jobs_count(&state.db).await,
    })
}

/// Lifecycle status of one job.
#[utoipa::path(
    get,
    path = "/internal/jobs/{job_id}",
    params(
        ("job_id" = Uuid, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Job status", body = JobStatusResponse),
        (status = 404, description = "Job not found", body = homematch_core::error::ApiError),
        (status = 500, description = "Store unreachable", body = homematch_core::error::ApiError)
    ),
    tag = "internal"
)]
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, AppError> {
    match try_get_job(&state.db, job_id).await? {
        Some(job) => Ok(Json(job.into())),
        None => Err(AppError::NotFound {
            resource: format!("job {job_id}"),
        }),
    }
}
