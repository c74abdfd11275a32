use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    UserRegistered,
    Login,
    Logout,
    AccountLocked,
    FaceRegistered,
    FaceFailure,
    TotpSetup,
    TotpEnabled,
    TotpFailure,
    CheckIn,
    CheckOut,
    UserActivated,
    UserDeactivated,
    UserUnlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct LoginAttempt {
    pub id: u64,
    pub user_id: Option<u64>,
    pub username: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
    #[schema(value_type = String)]
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLoginAttempt {
    pub user_id: Option<u64>,
    pub username: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<&'static str>,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct SecurityEvent {
    pub id: u64,
    pub user_id: Option<u64>,
    #[schema(example = "check_in")]
    pub event_type: String,
    pub description: String,
    pub ip_address: Option<String>,
    #[schema(example = "info")]
    pub severity: String,
    #[schema(value_type = String)]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub user_id: Option<u64>,
    pub event_type: EventType,
    pub description: String,
    pub ip_address: Option<String>,
    pub severity: Severity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub severity: Option<String>,
    pub offset: u32,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(EventType::CheckIn.as_ref(), "check_in");
        assert_eq!(EventType::TotpFailure.to_string(), "totp_failure");
        assert_eq!(EventType::from_str("account_locked").ok(), Some(EventType::AccountLocked));
        assert_eq!(Severity::Warning.as_ref(), "warning");
    }
}
