//! Abuse detection on top of the rate limiter. Classifies denials and
//! rapid-fire patterns into append-only abuse events. Event recording is
//! observability: persistence failures are swallowed with a warning and
//! never reach the primary request path.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use homematch_core::abuse::{
    AbuseEvent, AbuseEventType, AbuseSeverity, is_rapid_fire, severity_for_violation,
};
use homematch_core::context::RequestContext;

use crate::rate_limit::check_rate_limit;

/// Caller-observed signals fed into detection alongside the limiter
/// outcome.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AbuseSignals {
    /// Milliseconds since this caller's previous request, when the handler
    /// tracks it.
    pub request_interval_ms: Option<i64>,
}

/// Run the rate limiter for this endpoint/caller and classify the outcome.
/// Returns true when the caller should be treated as abusive (the check
/// was denied). Rapid-fire recording is a side effect only; it can fire
/// even when the primary check allowed the request.
pub async fn detect_abuse(
    pool: &PgPool,
    endpoint: &str,
    ctx: &RequestContext,
    signals: AbuseSignals,
) -> bool {
    let result = check_rate_limit(pool, endpoint, ctx, None).await;

    if is_rapid_fire(result.remaining, signals.request_interval_ms) {
        record_abuse_event(
            pool,
            ctx,
            AbuseEventType::RapidFire,
            AbuseSeverity::Medium,
            json!({
                "endpoint": endpoint,
                "remaining": result.remaining,
                "request_interval_ms": signals.request_interval_ms,
            }),
        )
        .await;
    }

    if !result.allowed {
        record_abuse_event(
            pool,
            ctx,
            AbuseEventType::RateLimitExceeded,
            severity_for_violation(result.remaining),
            json!({
                "endpoint": endpoint,
                "remaining": result.remaining,
                "reset_at": result.reset_at,
            }),
        )
        .await;
        return true;
    }

    false
}

/// Append one abuse event. Failures are logged and dropped.
pub async fn record_abuse_event(
    pool: &PgPool,
    ctx: &RequestContext,
    event_type: AbuseEventType,
    severity: AbuseSeverity,
    details: serde_json::Value,
) {
    let event = AbuseEvent {
        user_id: ctx.user_id,
        ip_address: ctx.ip_address.clone(),
        event_type,
        severity,
        details,
        created_at: Utc::now(),
    };
    if let Err(err) = sqlx::query(
        "INSERT INTO abuse_events \
         (user_id, ip_address, event_type, severity, details, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(event.user_id)
    .bind(&event.ip_address)
    .bind(event.event_type.as_str())
    .bind(event.severity.as_str())
    .bind(&event.details)
    .bind(event.created_at)
    .execute(pool)
    .await
    {
        tracing::warn!(
            error = %err,
            event_type = event.event_type.as_str(),
            severity = event.severity.as_str(),
            "failed to record abuse event"
        );
    }
}
