//! Tower layer applying per-endpoint fixed-window throttling.
//!
//! Maps request paths to named policies, builds the explicit
//! `RequestContext` from connection headers, and short-circuits denied
//! requests with a 429. Denials are classified into abuse events on a
//! detached task so recording can never slow or fail the response.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tower::{Layer, Service, ServiceExt};

use homematch_core::abuse::{AbuseEventType, severity_for_violation};
use homematch_core::context::RequestContext;

use crate::abuse::record_abuse_event;
use crate::rate_limit::{check_rate_limit, rate_limit_response};
use crate::state::EnforcementMode;

#[derive(Clone)]
pub struct ThrottleLayer {
    pool: sqlx::PgPool,
    mode: EnforcementMode,
}

impl ThrottleLayer {
    pub fn new(pool: sqlx::PgPool, mode: EnforcementMode) -> Self {
        Self { pool, mode }
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = ThrottleService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ThrottleService {
            inner,
            pool: self.pool.clone(),
            mode: self.mode,
        }
    }
}

#[derive(Clone)]
pub struct ThrottleService<S> {
    inner: S,
    pool: sqlx::PgPool,
    mode: EnforcementMode,
}

impl<S> Service<Request> for ThrottleService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);
        let pool = self.pool.clone();
        let mode = self.mode;

        Box::pin(async move {
            let Some(endpoint) = endpoint_for_path(req.method().as_str(), req.uri().path())
            else {
                return Ok(ready.oneshot(req).await.into_response());
            };

            let ctx = context_from_headers(req.headers());
            let result = check_rate_limit(&pool, endpoint, &ctx, None).await;

            if !result.allowed {
                let severity = severity_for_violation(result.remaining);
                let details = json!({
                    "endpoint": endpoint,
                    "remaining": result.remaining,
                    "reset_at": result.reset_at,
                    "path": req.uri().path(),
                });
                let recording_ctx = ctx.clone();
                let recording_pool = pool.clone();
                tokio::spawn(async move {
                    record_abuse_event(
                        &recording_pool,
                        &recording_ctx,
                        AbuseEventType::RateLimitExceeded,
                        severity,
                        details,
                    )
                    .await;
                });

                match mode {
                    EnforcementMode::Enforce => {
                        return Ok(rate_limit_response(&result, &ctx));
                    }
                    EnforcementMode::Shadow => {
                        tracing::info!(
                            endpoint,
                            identifier = %ctx.caller_identifier(),
                            remaining = result.remaining,
                            "shadow mode: rate limit denial not enforced"
                        );
                    }
                }
            }

            let mut response = ready.oneshot(req).await.into_response();
            annotate_throttle_headers(&mut response, result.remaining, result.reset_at.timestamp());
            Ok(response)
        })
    }
}

/// Map a request to the policy name that throttles it. Returns `None` for
/// unthrottled surfaces (health, docs, anything outside /v1).
fn endpoint_for_path(method: &str, path: &str) -> Option<&'static str> {
    let endpoint = match (method, path) {
        ("POST", "/v1/auth/login") => "login",
        ("POST", "/v1/auth/signup") => "signup",
        ("POST", "/v1/auth/password-reset") => "password_reset",
        ("POST", "/v1/messages") => "message_send",
        ("POST", "/v1/listings") => "listing_create",
        ("GET", "/v1/listings") => "listing_search",
        ("POST", "/v1/verification/start") => "verification_start",
        ("POST", "/v1/payments/checkout") => "payment_checkout",
        ("POST", _) if path.starts_with("/v1/groups/") && path.ends_with("/invites") => {
            "group_invite"
        }
        _ if path.starts_with("/v1/") => "default",
        _ => return None,
    };
    Some(endpoint)
}

/// Build the request context from connection headers: first forwarding hop
/// wins for the client address, and a correlation id is generated when the
/// caller did not supply one.
fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    let ip_address = header_str(headers, "x-forwarded-for")
        .and_then(|raw| raw.split(',').next().map(str::trim).map(str::to_string))
        .or_else(|| header_str(headers, "x-real-ip").map(str::to_string))
        .unwrap_or_default();
    let user_agent = header_str(headers, "user-agent").map(str::to_string);
    let request_id = header_str(headers, "x-request-id").map(str::to_string);

    // The middleware runs in front of authentication; throttling identity
    // here is address-based. Handlers that know the user call the limiter
    // with a user-bearing context themselves.
    RequestContext::new(None, ip_address, user_agent, request_id)
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn annotate_throttle_headers(response: &mut Response, remaining: i32, reset_epoch: i64) {
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        response.headers_mut().insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&reset_epoch.to_string()) {
        response.headers_mut().insert("x-ratelimit-reset", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_routes_map_to_their_policies() {
        assert_eq!(endpoint_for_path("POST", "/v1/auth/login"), Some("login"));
        assert_eq!(endpoint_for_path("POST", "/v1/auth/signup"), Some("signup"));
        assert_eq!(
            endpoint_for_path("POST", "/v1/auth/password-reset"),
            Some("password_reset")
        );
    }

    #[test]
    fn listing_methods_split_create_and_search() {
        assert_eq!(
            endpoint_for_path("POST", "/v1/listings"),
            Some("listing_create")
        );
        assert_eq!(
            endpoint_for_path("GET", "/v1/listings"),
            Some("listing_search")
        );
    }

    #[test]
    fn group_invites_match_by_shape() {
        assert_eq!(
            endpoint_for_path("POST", "/v1/groups/0192f0c1/invites"),
            Some("group_invite")
        );
        assert_eq!(
            endpoint_for_path("POST", "/v1/groups/0192f0c1/members"),
            Some("default")
        );
    }

    #[test]
    fn unknown_api_paths_fall_back_to_default_policy() {
        assert_eq!(endpoint_for_path("GET", "/v1/profiles/me"), Some("default"));
        assert_eq!(endpoint_for_path("DELETE", "/v1/messages/3"), Some("default"));
    }

    #[test]
    fn non_api_surfaces_are_unthrottled() {
        assert_eq!(endpoint_for_path("GET", "/health"), None);
        assert_eq!(endpoint_for_path("GET", "/swagger-ui"), None);
    }

    #[test]
    fn forwarded_for_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.7, 10.0.0.1".parse().unwrap(),
        );
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        let ctx = context_from_headers(&headers);
        assert_eq!(ctx.ip_address, "203.0.113.7");
        assert_eq!(ctx.caller_identifier(), "ip:203.0.113.7");
    }

    #[test]
    fn real_ip_used_when_no_forwarding_chain() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        let ctx = context_from_headers(&headers);
        assert_eq!(ctx.ip_address, "198.51.100.2");
    }

    #[test]
    fn missing_address_yields_unknown_identity() {
        let ctx = context_from_headers(&HeaderMap::new());
        assert_eq!(ctx.caller_identifier(), "unknown");
        assert!(!ctx.request_id.is_empty());
    }

    #[test]
    fn supplied_request_id_is_preserved() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "req-abc".parse().unwrap());
        let ctx = context_from_headers(&headers);
        assert_eq!(ctx.request_id, "req-abc");
    }
}
