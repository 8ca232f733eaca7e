use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier used when neither a user ID nor a client address is known.
pub const UNKNOWN_CALLER: &str = "unknown";

/// Request-scoped context threaded explicitly into every safeguard call.
///
/// The HTTP layer builds one of these from connection metadata and request
/// headers; everything below the handlers takes it as a plain parameter so
/// the safeguards stay testable without simulating a request-scoped global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub user_id: Option<Uuid>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(
        user_id: Option<Uuid>,
        ip_address: impl Into<String>,
        user_agent: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        Self {
            user_id,
            ip_address: normalize_ip(ip_address.into()),
            user_agent,
            request_id: request_id.unwrap_or_else(|| Uuid::now_v7().to_string()),
        }
    }

    /// Context for actions initiated by the platform itself (background
    /// workers, scheduled maintenance) rather than an inbound request.
    pub fn system() -> Self {
        Self {
            user_id: None,
            ip_address: UNKNOWN_CALLER.to_string(),
            user_agent: None,
            request_id: Uuid::now_v7().to_string(),
        }
    }

    /// Throttling identity for this caller: `user:<id>` when authenticated,
    /// `ip:<addr>` when only the client address is known, else `unknown`.
    pub fn caller_identifier(&self) -> String {
        if let Some(user_id) = self.user_id {
            return format!("user:{user_id}");
        }
        if self.ip_address != UNKNOWN_CALLER {
            return format!("ip:{}", self.ip_address);
        }
        UNKNOWN_CALLER.to_string()
    }
}

fn normalize_ip(raw: String) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNKNOWN_CALLER.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_caller_uses_user_identity() {
        let user_id = Uuid::now_v7();
        let ctx = RequestContext::new(Some(user_id), "203.0.113.7", None, None);
        assert_eq!(ctx.caller_identifier(), format!("user:{user_id}"));
    }

    #[test]
    fn anonymous_caller_falls_back_to_ip_identity() {
        let ctx = RequestContext::new(None, "203.0.113.7", None, None);
        assert_eq!(ctx.caller_identifier(), "ip:203.0.113.7");
    }

    #[test]
    fn caller_without_user_or_address_is_unknown() {
        let ctx = RequestContext::new(None, "  ", None, None);
        assert_eq!(ctx.caller_identifier(), UNKNOWN_CALLER);
    }

    #[test]
    fn system_context_has_no_caller_identity() {
        let ctx = RequestContext::system();
        assert!(ctx.user_id.is_none());
        assert_eq!(ctx.caller_identifier(), UNKNOWN_CALLER);
    }

    #[test]
    fn missing_request_id_is_generated() {
        let ctx = RequestContext::new(None, "203.0.113.7", None, None);
        assert!(!ctx.request_id.is_empty());
        let explicit = RequestContext::new(
            None,
            "203.0.113.7",
            None,
            Some("req-123".to_string()),
        );
        assert_eq!(explicit.request_id, "req-123");
    }
}
