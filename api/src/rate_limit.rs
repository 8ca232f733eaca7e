//! Fixed-window rate limiting backed by the `check_rate_limit` database
//! procedure. One atomic increment-and-check round trip per call; the
//! application holds no locks or in-memory counters.

use axum::body::Body;
use axum::http::{Response, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;

use homematch_core::context::RequestContext;
use homematch_core::error::codes;
use homematch_core::rate_limit::{PolicyOverride, RateLimitResult, policy_for};

#[derive(sqlx::FromRow)]
struct RateLimitCheckRow {
    allowed: bool,
    remaining: i32,
    reset_at: DateTime<Utc>,
}

/// Check the caller against the named endpoint policy.
///
/// Explicit override fields take precedence over the named policy, which
/// falls back to the default policy for unknown names.
///
/// Fails OPEN: any error talking to the counter store logs a warning and
/// returns an allowed result. Throttling accuracy is sacrificed so a
/// limiter outage never becomes a full outage.
pub async fn check_rate_limit(
    pool: &PgPool,
    endpoint: &str,
    ctx: &RequestContext,
    overrides: Option<PolicyOverride>,
) -> RateLimitResult {
    let policy = policy_for(endpoint).with_override(overrides.unwrap_or_default());
    let identifier = ctx.caller_identifier();

    match sqlx::query_as::<_, RateLimitCheckRow>(
        "SELECT allowed, remaining, reset_at FROM check_rate_limit($1, $2, $3, $4)",
    )
    .bind(&identifier)
    .bind(endpoint)
    .bind(policy.max_requests)
    .bind(policy.window_seconds)
    .fetch_one(pool)
    .await
    {
        Ok(row) => RateLimitResult {
            allowed: row.allowed,
            remaining: row.remaining,
            reset_at: row.reset_at,
            blocked: !row.allowed,
        },
        Err(err) => {
            tracing::warn!(
                error = %err,
                endpoint,
                identifier = %identifier,
                "rate limit check failed; failing open"
            );
            RateLimitResult::open(&policy, Utc::now())
        }
    }
}

/// Build the 429 response for a denied check: structured JSON error body
/// plus `X-RateLimit-Remaining`, `X-RateLimit-Reset`, and `Retry-After`
/// (whole seconds, clamped to zero).
pub fn rate_limit_response(result: &RateLimitResult, ctx: &RequestContext) -> Response<Body> {
    let retry_after = result.retry_after_seconds(Utc::now());
    let body = json!({
        "error": codes::RATE_LIMITED,
        "message": format!("Too many requests. Retry after {retry_after} seconds."),
        "request_id": ctx.request_id,
    });

    Response::builder()
        .status(StatusCode::TOO_MANY_REQUESTS)
        .header("content-type", "application/json")
        .header("x-ratelimit-remaining", result.remaining.to_string())
        .header("x-ratelimit-reset", result.reset_at.timestamp().to_string())
        .header("retry-after", retry_after.to_string())
        .body(Body::from(body.to_string()))
        .expect("rate limit response should build")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn denied_result(reset_in: i64) -> RateLimitResult {
        RateLimitResult {
            allowed: false,
            remaining: -3,
            reset_at: Utc::now() + Duration::seconds(reset_in),
            blocked: true,
        }
    }

    #[test]
    fn denial_response_carries_throttle_headers() {
        let ctx = RequestContext::new(None, "203.0.113.7", None, Some("req-1".into()));
        let response = rate_limit_response(&denied_result(30), &ctx);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("x-ratelimit-remaining").unwrap(),
            "-3"
        );
        let retry_after: i64 = response
            .headers()
            .get("retry-after")
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((29..=30).contains(&retry_after));
    }

    #[test]
    fn retry_after_never_goes_negative() {
        let ctx = RequestContext::new(None, "203.0.113.7", None, Some("req-2".into()));
        let response = rate_limit_response(&denied_result(-10), &ctx);
        assert_eq!(response.headers().get("retry-after").unwrap(), "0");
    }

    #[tokio::test]
    async fn denial_body_echoes_request_id_and_error_code() {
        let ctx = RequestContext::new(None, "203.0.113.7", None, Some("req-3".into()));
        let response = rate_limit_response(&denied_result(5), &ctx);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], codes::RATE_LIMITED);
        assert_eq!(body["request_id"], "req-3");
    }
}
