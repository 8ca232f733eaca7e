use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Label that does not name any queue or status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown label: {0}")]
pub struct UnknownLabel(pub String);

/// Named queues. `scheduled` carries deferred work; the rest differ only
/// in the priority workers poll them with.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum JobQueue {
    Default,
    High,
    Low,
    Scheduled,
}

impl JobQueue {
    pub const ALL: [JobQueue; 4] = [
        JobQueue::Default,
        JobQueue::High,
        JobQueue::Low,
        JobQueue::Scheduled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobQueue::Default => "default",
            JobQueue::High => "high",
            JobQueue::Low => "low",
            JobQueue::Scheduled => "scheduled",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        label.parse().ok()
    }
}

impl std::str::FromStr for JobQueue {
    type Err = UnknownLabel;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|queue| queue.as_str() == label)
            .ok_or_else(|| UnknownLabel(label.to_string()))
    }
}

/// Job lifecycle. `completed`, `failed`, and `cancelled` are terminal;
/// nothing ever leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        label.parse().ok()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::str::FromStr for JobStatus {
    type Err = UnknownLabel;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ]
        .into_iter()
        .find(|status| status.as_str() == label)
        .ok_or_else(|| UnknownLabel(label.to_string()))
    }
}

/// A unit of asynchronous work. Claimed, executed, and completed/failed by
/// a worker process outside this crate.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub queue: JobQueue,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub scheduled_for: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Optional knobs for `enqueue_job`. Unset fields take the queue defaults
/// (default queue, priority 0, run immediately, 3 attempts).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    pub queue: Option<JobQueue>,
    pub priority: Option<i32>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub max_attempts: Option<i32>,
}

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Status a `running` job moves to after a failure, given the attempt
/// count after the failing run is charged.
pub fn status_after_failure(attempts_after: i32, max_attempts: i32) -> JobStatus {
    if attempts_after >= max_attempts {
        JobStatus::Failed
    } else {
        JobStatus::Pending
    }
}

/// Recurrence marker keys. Recurrence is a payload convention honored by
/// workers (they re-schedule themselves after a run), not a queue feature.
pub const RECURRING_KEY: &str = "_recurring";
pub const INTERVAL_MINUTES_KEY: &str = "_intervalMinutes";

/// Stamp a payload so a worker can re-schedule the job after execution.
/// Non-object payloads are wrapped into an object first.
pub fn stamp_recurring(payload: serde_json::Value, interval_minutes: i64) -> serde_json::Value {
    let mut object = match payload {
        serde_json::Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    };
    object.insert(RECURRING_KEY.to_string(), json!(true));
    object.insert(INTERVAL_MINUTES_KEY.to_string(), json!(interval_minutes));
    serde_json::Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_labels_round_trip() {
        for queue in JobQueue::ALL {
            assert_eq!(JobQueue::from_label(queue.as_str()), Some(queue));
        }
        assert_eq!(JobQueue::from_label("nope"), None);
    }

    #[test]
    fn parsing_unknown_label_reports_the_label() {
        let err = "mystery".parse::<JobQueue>().unwrap_err();
        assert_eq!(err, UnknownLabel("mystery".to_string()));
        assert!("mystery".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_states_are_exactly_three() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn failure_retries_until_attempts_exhausted() {
        // maxAttempts = 3: two retries, third failure is final.
        assert_eq!(status_after_failure(1, 3), JobStatus::Pending);
        assert_eq!(status_after_failure(2, 3), JobStatus::Pending);
        assert_eq!(status_after_failure(3, 3), JobStatus::Failed);
    }

    #[test]
    fn recurring_stamp_marks_object_payloads() {
        let payload = stamp_recurring(json!({"report": "weekly_digest"}), 60);
        assert_eq!(payload[RECURRING_KEY], json!(true));
        assert_eq!(payload[INTERVAL_MINUTES_KEY], json!(60));
        assert_eq!(payload["report"], json!("weekly_digest"));
    }

    #[test]
    fn recurring_stamp_wraps_non_object_payloads() {
        let payload = stamp_recurring(json!("raw"), 15);
        assert_eq!(payload["payload"], json!("raw"));
        assert_eq!(payload[RECURRING_KEY], json!(true));
    }
}
