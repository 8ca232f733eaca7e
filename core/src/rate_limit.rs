use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Fixed-window throttling policy for one named endpoint.
///
/// Windows are aligned to fixed boundaries, not sliding: a burst straddling
/// a boundary can momentarily exceed the nominal rate. Accepted trade-off
/// for a single atomic counter round trip per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub endpoint: &'static str,
    pub max_requests: i32,
    pub window_seconds: i32,
}

/// Fallback policy for endpoint names with no dedicated entry.
pub const DEFAULT_POLICY: RateLimitPolicy = RateLimitPolicy {
    endpoint: "default",
    max_requests: 100,
    window_seconds: 60,
};

/// Per-endpoint policies for the marketplace surface. Names are looked up
/// by the HTTP adapter and by handlers calling the limiter directly.
const POLICIES: &[RateLimitPolicy] = &[
    RateLimitPolicy {
        endpoint: "login",
        max_requests: 5,
        window_seconds: 60,
    },
    RateLimitPolicy {
        endpoint: "signup",
        max_requests: 3,
        window_seconds: 3600,
    },
    RateLimitPolicy {
        endpoint: "password_reset",
        max_requests: 3,
        window_seconds: 3600,
    },
    RateLimitPolicy {
        endpoint: "message_send",
        max_requests: 30,
        window_seconds: 60,
    },
    RateLimitPolicy {
        endpoint: "listing_create",
        max_requests: 10,
        window_seconds: 3600,
    },
    RateLimitPolicy {
        endpoint: "listing_search",
        max_requests: 120,
        window_seconds: 60,
    },
    RateLimitPolicy {
        endpoint: "verification_start",
        max_requests: 3,
        window_seconds: 3600,
    },
    RateLimitPolicy {
        endpoint: "payment_checkout",
        max_requests: 10,
        window_seconds: 600,
    },
    RateLimitPolicy {
        endpoint: "group_invite",
        max_requests: 20,
        window_seconds: 3600,
    },
];

/// Resolve the policy for an endpoint name, falling back to the default
/// for unrecognized names.
pub fn policy_for(endpoint: &str) -> RateLimitPolicy {
    POLICIES
        .iter()
        .copied()
        .find(|policy| policy.endpoint == endpoint)
        .unwrap_or(DEFAULT_POLICY)
}

/// Caller-supplied overrides for individual policy fields. Explicit fields
/// take precedence over the named policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyOverride {
    pub max_requests: Option<i32>,
    pub window_seconds: Option<i32>,
}

impl RateLimitPolicy {
    /// Apply field-level overrides. Both dimensions are kept strictly
    /// positive so a bad override can never produce a zero-width window.
    pub fn with_override(self, overrides: PolicyOverride) -> Self {
        Self {
            endpoint: self.endpoint,
            max_requests: overrides.max_requests.unwrap_or(self.max_requests).max(1),
            window_seconds: overrides
                .window_seconds
                .unwrap_or(self.window_seconds)
                .max(1),
        }
    }
}

/// Outcome of one rate-limit check.
///
/// `remaining` can go negative to signal the degree of violation; abuse
/// classification keys off how far below zero it has gone.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: i32,
    pub reset_at: DateTime<Utc>,
    pub blocked: bool,
}

impl RateLimitResult {
    /// Fail-open result used when the counter store is unreachable: the
    /// request is allowed and the window is reported as untouched. A
    /// limiter outage must never become a full outage.
    pub fn open(policy: &RateLimitPolicy, now: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            remaining: policy.max_requests,
            reset_at: now + Duration::seconds(i64::from(policy.window_seconds)),
            blocked: false,
        }
    }

    /// Whole seconds until the window resets, clamped to zero for windows
    /// that have already elapsed. Suitable for a `Retry-After` header.
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.reset_at - now).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_endpoint_resolves_its_policy() {
        let policy = policy_for("login");
        assert_eq!(policy.max_requests, 5);
        assert_eq!(policy.window_seconds, 60);
    }

    #[test]
    fn unknown_endpoint_falls_back_to_default() {
        assert_eq!(policy_for("no_such_endpoint"), DEFAULT_POLICY);
    }

    #[test]
    fn override_fields_take_precedence() {
        let policy = policy_for("login").with_override(PolicyOverride {
            max_requests: Some(50),
            window_seconds: None,
        });
        assert_eq!(policy.max_requests, 50);
        assert_eq!(policy.window_seconds, 60);
    }

    #[test]
    fn override_cannot_produce_non_positive_policy() {
        let policy = policy_for("login").with_override(PolicyOverride {
            max_requests: Some(0),
            window_seconds: Some(-5),
        });
        assert_eq!(policy.max_requests, 1);
        assert_eq!(policy.window_seconds, 1);
    }

    #[test]
    fn all_static_policies_are_positive() {
        for policy in POLICIES.iter().chain(std::iter::once(&DEFAULT_POLICY)) {
            assert!(policy.max_requests > 0, "{}", policy.endpoint);
            assert!(policy.window_seconds > 0, "{}", policy.endpoint);
        }
    }

    #[test]
    fn retry_after_is_clamped_to_zero() {
        let now = Utc::now();
        let result = RateLimitResult {
            allowed: false,
            remaining: -1,
            reset_at: now - Duration::seconds(30),
            blocked: true,
        };
        assert_eq!(result.retry_after_seconds(now), 0);

        let result = RateLimitResult {
            allowed: false,
            remaining: -1,
            reset_at: now + Duration::seconds(42),
            blocked: true,
        };
        assert_eq!(result.retry_after_seconds(now), 42);
    }

    #[test]
    fn fail_open_result_allows_with_full_window() {
        let now = Utc::now();
        let policy = policy_for("login");
        let result = RateLimitResult::open(&policy, now);
        assert!(result.allowed);
        assert!(!result.blocked);
        assert_eq!(result.remaining, policy.max_requests);
        assert_eq!(result.retry_after_seconds(now), 60);
    }
}
