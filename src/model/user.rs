use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone_number: Option<String>,

    /// Digest of the enrolled capture; compared by the configured face policy
    pub face_reference: Option<Vec<u8>>,
    pub face_registered: bool,

    /// Base32 shared secret, present once setup has started
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,

    pub failed_login_attempts: u32,
    pub last_failed_login_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,

    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn login_state(&self) -> LoginState {
        LoginState {
            failed_login_attempts: self.failed_login_attempts,
            last_failed_login_at: self.last_failed_login_at,
            locked_until: self.locked_until,
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub is_admin: bool,
}

/// Failed-login bookkeeping persisted on the user row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginState {
    pub failed_login_attempts: u32,
    pub last_failed_login_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    #[schema(example = "Jane Doe")]
    pub full_name: Option<String>,
    #[schema(example = "jane@company.com")]
    pub email: Option<String>,
    #[schema(example = "+8801712345678")]
    pub phone_number: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.email.is_none() && self.phone_number.is_none()
    }
}

/// What a user may see about themselves; secrets and factor material stay server side.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfile {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "jdoe@company.com")]
    pub email: String,
    #[schema(example = "John Doe")]
    pub full_name: String,
    pub phone_number: Option<String>,
    pub face_registered: bool,
    pub totp_enabled: bool,
    pub is_active: bool,
    pub is_admin: bool,
    #[schema(value_type = String, example = "2026-01-01T09:00:00Z")]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            full_name: u.full_name.clone(),
            phone_number: u.phone_number.clone(),
            face_registered: u.face_registered,
            totp_enabled: u.totp_enabled,
            is_active: u.is_active,
            is_admin: u.is_admin,
            created_at: u.created_at,
        }
    }
}

/// Admin listing row; adds the lockout bookkeeping to the profile.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub failed_login_attempts: u32,
    #[schema(value_type = Option<String>)]
    pub locked_until: Option<DateTime<Utc>>,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            profile: UserProfile::from(u),
            failed_login_attempts: u.failed_login_attempts,
            locked_until: u.locked_until,
        }
    }
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct UserStats {
    pub total_users: i64,
    pub active_users: i64,
    pub locked_users: i64,
    pub users_with_face: i64,
    pub users_with_totp: i64,
}
