//! Append-only audit and security logging. Every write is fire-and-forget
//! from the caller's point of view: the returned `Result` is contractually
//! discardable, and the error branch has already been logged here. A
//! logging outage must degrade silently, never cascade into user-facing
//! failures.

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use homematch_core::audit::{
    ActorType, AuditAction, AuditLogEntry, SecurityEvent, event_types,
};
use homematch_core::context::RequestContext;
use homematch_core::risk::{RiskFactors, calculate_risk_score};

/// Persist one audit entry, enriched with the request context. The caller
/// may discard the result; failures are already logged.
pub async fn audit_log(
    pool: &PgPool,
    ctx: &RequestContext,
    entry: AuditLogEntry,
) -> Result<(), sqlx::Error> {
    let outcome = sqlx::query(
        "INSERT INTO audit_log \
         (actor_id, actor_type, action, resource_type, resource_id, \
          old_values, new_values, ip_address, user_agent, request_id, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(entry.actor_id)
    .bind(entry.actor_type.as_str())
    .bind(entry.action.as_str())
    .bind(&entry.resource_type)
    .bind(entry.resource_id.as_deref())
    .bind(entry.old_values)
    .bind(entry.new_values)
    .bind(&ctx.ip_address)
    .bind(ctx.user_agent.as_deref())
    .bind(&ctx.request_id)
    .bind(entry.metadata)
    .execute(pool)
    .await;

    if let Err(ref err) = outcome {
        tracing::warn!(
            error = %err,
            resource_type = %entry.resource_type,
            action = entry.action.as_str(),
            "failed to write audit log entry"
        );
    }
    outcome.map(|_| ())
}

/// Persist one security event, enriched with the request context. Same
/// discardable-result contract as `audit_log`.
pub async fn security_log(
    pool: &PgPool,
    ctx: &RequestContext,
    event: SecurityEvent,
) -> Result<(), sqlx::Error> {
    let outcome = sqlx::query(
        "INSERT INTO security_events \
         (user_id, event_type, ip_address, user_agent, risk_score, details) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(event.user_id)
    .bind(&event.event_type)
    .bind(&ctx.ip_address)
    .bind(ctx.user_agent.as_deref())
    .bind(i16::from(event.risk_score))
    .bind(event.details)
    .execute(pool)
    .await;

    if let Err(ref err) = outcome {
        tracing::warn!(
            error = %err,
            event_type = %event.event_type,
            "failed to write security event"
        );
    }
    outcome.map(|_| ())
}

/// Audit a create/update/delete of a domain record.
pub async fn audit_data_change(
    pool: &PgPool,
    ctx: &RequestContext,
    user_id: Uuid,
    action: AuditAction,
    resource_type: &str,
    resource_id: &str,
    old_values: Option<serde_json::Value>,
    new_values: Option<serde_json::Value>,
) -> Result<(), sqlx::Error> {
    let mut entry = AuditLogEntry::new(Some(user_id), ActorType::User, action, resource_type);
    entry.resource_id = Some(resource_id.to_string());
    entry.old_values = old_values;
    entry.new_values = new_values;
    audit_log(pool, ctx, entry).await
}

/// Record an authentication outcome: a security event always, plus a
/// session audit entry on success for a known user.
pub async fn audit_auth(
    pool: &PgPool,
    ctx: &RequestContext,
    user_id: Option<Uuid>,
    success: bool,
    method: &str,
    details: Option<serde_json::Value>,
) -> Result<(), sqlx::Error> {
    let (event_type, risk_score) = auth_event(success);
    let event = SecurityEvent {
        user_id,
        event_type: event_type.to_string(),
        risk_score,
        details: Some(json!({
            "method": method,
            "details": details,
        })),
    };
    security_log(pool, ctx, event).await?;

    if success && let Some(user_id) = user_id {
        let mut entry =
            AuditLogEntry::new(Some(user_id), ActorType::User, AuditAction::Login, "session");
        entry.metadata = Some(json!({ "method": method }));
        audit_log(pool, ctx, entry).await?;
    }
    Ok(())
}

/// Record an elevated-privilege action: an admin audit entry plus a scored
/// security event, so the privileged trail survives either table.
pub async fn audit_admin_action(
    pool: &PgPool,
    ctx: &RequestContext,
    admin_id: Uuid,
    action: AuditAction,
    resource_type: &str,
    resource_id: Option<&str>,
    details: Option<serde_json::Value>,
) -> Result<(), sqlx::Error> {
    let mut entry = AuditLogEntry::new(Some(admin_id), ActorType::Admin, action, resource_type);
    entry.resource_id = resource_id.map(ToString::to_string);
    entry.metadata = details.clone();
    audit_log(pool, ctx, entry).await?;

    security_log(
        pool,
        ctx,
        SecurityEvent {
            user_id: Some(admin_id),
            event_type: event_types::ADMIN_ACTION.to_string(),
            risk_score: ADMIN_ACTION_RISK_SCORE,
            details,
        },
    )
    .await
}

/// Score a login attempt's risk factors and persist the resulting event.
pub async fn audit_scored_login(
    pool: &PgPool,
    ctx: &RequestContext,
    user_id: Option<Uuid>,
    success: bool,
    factors: &RiskFactors,
) -> Result<(), sqlx::Error> {
    let (event_type, base_score) = auth_event(success);
    let scored = calculate_risk_score(factors).max(base_score);
    security_log(
        pool,
        ctx,
        SecurityEvent {
            user_id,
            event_type: event_type.to_string(),
            risk_score: scored,
            details: Some(json!({
                "new_device": factors.new_device,
                "new_location": factors.new_location,
                "failed_attempts": factors.failed_attempts,
                "vpn_detected": factors.vpn_detected,
            })),
        },
    )
    .await
}

const ADMIN_ACTION_RISK_SCORE: u8 = 10;
const FAILED_LOGIN_RISK_SCORE: u8 = 30;

fn auth_event(success: bool) -> (&'static str, u8) {
    if success {
        (event_types::LOGIN_SUCCESS, 0)
    } else {
        (event_types::LOGIN_FAILED, FAILED_LOGIN_RISK_SCORE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_event_maps_outcome_to_type_and_base_risk() {
        assert_eq!(auth_event(true), (event_types::LOGIN_SUCCESS, 0));
        assert_eq!(auth_event(false), (event_types::LOGIN_FAILED, 30));
    }
}
