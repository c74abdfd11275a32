use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{
    auth::auth::ClientInfo,
    model::audit::{EventType, NewLoginAttempt, NewSecurityEvent, Severity},
    store::Store,
};

/// Appends a security event. A failed write is logged and dropped so the audit
/// trail can never fail the operation it describes.
pub async fn record_event(
    store: &dyn Store,
    user_id: Option<u64>,
    event_type: EventType,
    severity: Severity,
    description: impl Into<String>,
    client: &ClientInfo,
    now: DateTime<Utc>,
) {
    let event = NewSecurityEvent {
        user_id,
        event_type,
        description: description.into(),
        ip_address: client.ip_address.clone(),
        severity,
        occurred_at: now,
    };

    if let Err(e) = store.insert_security_event(event).await {
        warn!(error = %e, event = %event_type, "Failed to record security event");
    }
}

pub async fn record_login_attempt(
    store: &dyn Store,
    user_id: Option<u64>,
    username: &str,
    client: &ClientInfo,
    failure_reason: Option<&'static str>,
    now: DateTime<Utc>,
) {
    let attempt = NewLoginAttempt {
        user_id,
        username: username.to_string(),
        ip_address: client.ip_address.clone(),
        user_agent: client.user_agent.clone(),
        success: failure_reason.is_none(),
        failure_reason,
        attempted_at: now,
    };

    if let Err(e) = store.insert_login_attempt(attempt).await {
        warn!(error = %e, username = %username, "Failed to record login attempt");
    }
}
