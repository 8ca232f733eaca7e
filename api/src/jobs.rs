//! Persistent background job queue. All lifecycle transitions ride on the
//! atomic database procedures (`claim_background_job`,
//! `complete_background_job`, `fail_background_job`); the application never
//! holds a lock or retries a claim.
//!
//! Infrastructure failures surface as `None`/`false`/zeroed returns, never
//! panics. `enqueue_job` returning `None` is the one failure callers are
//! expected to detect and compensate for — a silently dropped job is a
//! correctness issue, not just lost telemetry.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use homematch_core::jobs::{
    DEFAULT_MAX_ATTEMPTS, EnqueueOptions, Job, JobQueue, JobStatus, stamp_recurring,
};

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    queue: String,
    job_type: String,
    payload: serde_json::Value,
    priority: i32,
    status: String,
    attempts: i32,
    max_attempts: i32,
    scheduled_for: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    result: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Job {
        Job {
            id: self.id,
            queue: JobQueue::from_label(&self.queue).unwrap_or(JobQueue::Default),
            job_type: self.job_type,
            payload: self.payload,
            priority: self.priority,
            status: JobStatus::from_label(&self.status).unwrap_or(JobStatus::Pending),
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            scheduled_for: self.scheduled_for,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_message: self.error_message,
            result: self.result,
            created_at: self.created_at,
        }
    }
}

const JOB_COLUMNS: &str = "id, queue, job_type, payload, priority, status, attempts, \
     max_attempts, scheduled_for, started_at, completed_at, error_message, result, created_at";

/// A job to insert; used directly by `enqueue_jobs`.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub options: EnqueueOptions,
}

/// Insert a new `pending` job. Returns `None` on persistence failure
/// (logged) — callers decide their own fallback for work that was not
/// enqueued.
pub async fn enqueue_job(
    pool: &PgPool,
    job_type: &str,
    payload: serde_json::Value,
    options: EnqueueOptions,
) -> Option<Job> {
    let queue = options.queue.unwrap_or(JobQueue::Default);
    let priority = options.priority.unwrap_or(0);
    let scheduled_for = options.scheduled_for.unwrap_or_else(Utc::now);
    let max_attempts = options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1);

    let query = format!(
        "INSERT INTO background_jobs \
         (id, queue, job_type, payload, priority, status, attempts, max_attempts, scheduled_for) \
         VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6, $7) \
         RETURNING {JOB_COLUMNS}"
    );
    match sqlx::query_as::<_, JobRow>(&query)
        .bind(Uuid::now_v7())
        .bind(queue.as_str())
        .bind(job_type)
        .bind(payload)
        .bind(priority)
        .bind(max_attempts)
        .bind(scheduled_for)
        .fetch_one(pool)
        .await
    {
        Ok(row) => Some(row.into_job()),
        Err(err) => {
            tracing::warn!(error = %err, job_type, queue = queue.as_str(), "failed to enqueue job");
            None
        }
    }
}

/// Batch enqueue. Returns the number actually inserted; 0 on total failure.
pub async fn enqueue_jobs(pool: &PgPool, requests: Vec<JobRequest>) -> usize {
    let mut inserted = 0;
    for request in requests {
        if enqueue_job(pool, &request.job_type, request.payload, request.options)
            .await
            .is_some()
        {
            inserted += 1;
        }
    }
    inserted
}

/// Enqueue onto the scheduled queue with a deferred run time.
pub async fn schedule_job(
    pool: &PgPool,
    job_type: &str,
    payload: serde_json::Value,
    run_at: DateTime<Utc>,
) -> Option<Job> {
    enqueue_job(
        pool,
        job_type,
        payload,
        EnqueueOptions {
            queue: Some(JobQueue::Scheduled),
            scheduled_for: Some(run_at),
            ..Default::default()
        },
    )
    .await
}

/// Schedule a self-perpetuating job. The queue has no native recurrence:
/// the payload is stamped so the worker re-schedules the next run after
/// executing this one.
pub async fn schedule_recurring_job(
    pool: &PgPool,
    job_type: &str,
    payload: serde_json::Value,
    interval_minutes: i64,
) -> Option<Job> {
    let stamped = stamp_recurring(payload, interval_minutes);
    let first_run = Utc::now() + Duration::minutes(interval_minutes);
    schedule_job(pool, job_type, stamped, first_run).await
}

/// Atomically claim one eligible job from a queue (`pending`,
/// `scheduled_for <= now`, highest priority first, oldest first among
/// ties). The procedure's `FOR UPDATE SKIP LOCKED` selection guarantees
/// exactly one concurrent caller observes any given job.
pub async fn claim_job(pool: &PgPool, queue: JobQueue) -> Option<Job> {
    match sqlx::query_as::<_, JobRow>("SELECT * FROM claim_background_job($1)")
        .bind(queue.as_str())
        .fetch_optional(pool)
        .await
    {
        Ok(row) => row.map(JobRow::into_job),
        Err(err) => {
            tracing::warn!(error = %err, queue = queue.as_str(), "failed to claim job");
            None
        }
    }
}

/// Mark a running job completed, recording its result. Returns false when
/// the job was not in `running` or the store call failed.
pub async fn complete_job(pool: &PgPool, job_id: Uuid, result: Option<serde_json::Value>) -> bool {
    match sqlx::query_scalar::<_, bool>("SELECT complete_background_job($1, $2)")
        .bind(job_id)
        .bind(result)
        .fetch_one(pool)
        .await
    {
        Ok(transitioned) => transitioned,
        Err(err) => {
            tracing::warn!(error = %err, job_id = %job_id, "failed to complete job");
            false
        }
    }
}

/// Record a failed run. The procedure charges the attempt and moves the job
/// back to `pending` (retry) or to `failed` once attempts are exhausted.
pub async fn fail_job(pool: &PgPool, job_id: Uuid, error_message: &str) -> bool {
    match sqlx::query_scalar::<_, bool>("SELECT fail_background_job($1, $2)")
        .bind(job_id)
        .bind(error_message)
        .fetch_one(pool)
        .await
    {
        Ok(transitioned) => transitioned,
        Err(err) => {
            tracing::warn!(error = %err, job_id = %job_id, "failed to record job failure");
            false
        }
    }
}

/// Cancel a job that has not started. Only `pending` jobs cancel; anything
/// else (including `running`) is left untouched and reported as false.
pub async fn cancel_job(pool: &PgPool, job_id: Uuid) -> bool {
    match sqlx::query(
        "UPDATE background_jobs SET status = 'cancelled' \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(job_id)
    .execute(pool)
    .await
    {
        Ok(outcome) => outcome.rows_affected() > 0,
        Err(err) => {
            tracing::warn!(error = %err, job_id = %job_id, "failed to cancel job");
            false
        }
    }
}

/// Fetch one job by id, surfacing store errors to the caller. The ops
/// routes use this so a store outage reads as a 500, not a missing job.
pub async fn try_get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    let query = format!("SELECT {JOB_COLUMNS} FROM background_jobs WHERE id = $1");
    let row = sqlx::query_as::<_, JobRow>(&query)
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(JobRow::into_job))
}

/// Fetch one job by id. Store errors are logged and reported as absent.
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Option<Job> {
    match try_get_job(pool, job_id).await {
        Ok(job) => job,
        Err(err) => {
            tracing::warn!(error = %err, job_id = %job_id, "failed to fetch job");
            None
        }
    }
}

/// Count pending, due jobs per queue. All four queues are always present
/// in the result; on store error every count is zero.
pub async fn get_pending_jobs_count(pool: &PgPool) -> BTreeMap<JobQueue, i64> {
    let mut counts = zeroed_queue_counts();
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT queue, COUNT(*) FROM background_jobs \
         WHERE status = 'pending' AND scheduled_for <= now() \
         GROUP BY queue",
    )
    .fetch_all(pool)
    .await;

    match rows {
        Ok(rows) => {
            for (label, count) in rows {
                if let Some(queue) = JobQueue::from_label(&label) {
                    counts.insert(queue, count);
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to count pending jobs; reporting zeros");
        }
    }
    counts
}

fn zeroed_queue_counts() -> BTreeMap<JobQueue, i64> {
    JobQueue::ALL.into_iter().map(|queue| (queue, 0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zeroed_counts_cover_every_queue() {
        let counts = zeroed_queue_counts();
        assert_eq!(counts.len(), 4);
        for queue in JobQueue::ALL {
            assert_eq!(counts.get(&queue), Some(&0));
        }
    }

    #[test]
    fn job_row_tolerates_unknown_labels() {
        let row = JobRow {
            id: Uuid::now_v7(),
            queue: "mystery".to_string(),
            job_type: "send_email".to_string(),
            payload: json!({}),
            priority: 0,
            status: "mystery".to_string(),
            attempts: 0,
            max_attempts: 3,
            scheduled_for: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            result: None,
            created_at: Utc::now(),
        };
        let job = row.into_job();
        assert_eq!(job.queue, JobQueue::Default);
        assert_eq!(job.status, JobStatus::Pending);
    }
}
