use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who performed an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    Admin,
    System,
    Webhook,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::Admin => "admin",
            ActorType::System => "system",
            ActorType::Webhook => "webhook",
        }
    }
}

/// What an audited action did to its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
    AdminAction,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::AdminAction => "admin_action",
        }
    }
}

/// One append-only audit record. Request context (caller IP, user agent,
/// correlation id) is attached at persist time from the `RequestContext`;
/// this struct carries only what the caller knows.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub actor_id: Option<Uuid>,
    pub actor_type: ActorType,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

impl AuditLogEntry {
    pub fn new(
        actor_id: Option<Uuid>,
        actor_type: ActorType,
        action: AuditAction,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            actor_type,
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            old_values: None,
            new_values: None,
            metadata: None,
        }
    }
}

/// One append-only security event (auth outcomes, admin escalations,
/// anything scored for risk).
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub user_id: Option<Uuid>,
    pub event_type: String,
    pub risk_score: u8,
    pub details: Option<serde_json::Value>,
}

pub mod event_types {
    pub const LOGIN_SUCCESS: &str = "login_success";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const ADMIN_ACTION: &str = "admin_action";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_and_action_labels_match_persisted_form() {
        assert_eq!(ActorType::Webhook.as_str(), "webhook");
        assert_eq!(AuditAction::AdminAction.as_str(), "admin_action");
    }

    #[test]
    fn entry_builder_leaves_value_snapshots_empty() {
        let entry = AuditLogEntry::new(None, ActorType::System, AuditAction::Create, "listing");
        assert!(entry.old_values.is_none());
        assert!(entry.new_values.is_none());
        assert_eq!(entry.resource_type, "listing");
    }
}
