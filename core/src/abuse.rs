use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A caller whose `remaining` budget has sunk this far below zero is
/// hammering the endpoint, not just briefly over the line.
pub const DEEP_VIOLATION_REMAINING: i32 = -10;

/// Rapid-fire recording kicks in once fewer than this many requests remain
/// in the window.
pub const RAPID_FIRE_REMAINING_THRESHOLD: i32 = 5;

/// Inter-request gap (milliseconds) below which a near-exhausted caller is
/// considered to be firing requests programmatically.
pub const RAPID_FIRE_INTERVAL_MS: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbuseEventType {
    RateLimitExceeded,
    RapidFire,
}

impl AbuseEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbuseEventType::RateLimitExceeded => "rate_limit_exceeded",
            AbuseEventType::RapidFire => "rapid_fire",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbuseSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AbuseSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbuseSeverity::Low => "low",
            AbuseSeverity::Medium => "medium",
            AbuseSeverity::High => "high",
            AbuseSeverity::Critical => "critical",
        }
    }
}

/// Append-only record of an observed abuse signal. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct AbuseEvent {
    pub user_id: Option<Uuid>,
    pub ip_address: String,
    pub event_type: AbuseEventType,
    pub severity: AbuseSeverity,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Severity of a denied rate-limit check, keyed on how far past the budget
/// the caller has gone.
pub fn severity_for_violation(remaining: i32) -> AbuseSeverity {
    if remaining <= DEEP_VIOLATION_REMAINING {
        AbuseSeverity::High
    } else {
        AbuseSeverity::Medium
    }
}

/// Rapid-fire predicate: near-exhausted budget combined with a sub-100ms
/// inter-request gap. Recording-only signal; it never gates a request.
pub fn is_rapid_fire(remaining: i32, request_interval_ms: Option<i64>) -> bool {
    remaining < RAPID_FIRE_REMAINING_THRESHOLD
        && request_interval_ms.is_some_and(|ms| ms < RAPID_FIRE_INTERVAL_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shallow_violation_is_medium_severity() {
        assert_eq!(severity_for_violation(-1), AbuseSeverity::Medium);
        assert_eq!(severity_for_violation(-9), AbuseSeverity::Medium);
    }

    #[test]
    fn deep_violation_is_high_severity() {
        assert_eq!(severity_for_violation(-10), AbuseSeverity::High);
        assert_eq!(severity_for_violation(-50), AbuseSeverity::High);
    }

    #[test]
    fn rapid_fire_requires_both_conditions() {
        assert!(is_rapid_fire(4, Some(50)));
        assert!(!is_rapid_fire(5, Some(50)), "budget not yet near exhaustion");
        assert!(!is_rapid_fire(4, Some(100)), "interval at threshold is not rapid");
        assert!(!is_rapid_fire(4, None), "no interval signal supplied");
    }

    #[test]
    fn labels_are_snake_case() {
        assert_eq!(AbuseEventType::RateLimitExceeded.as_str(), "rate_limit_exceeded");
        assert_eq!(AbuseSeverity::High.as_str(), "high");
    }
}
