use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;

use crate::auth::lockout::LockoutPolicy;
use crate::model::{
    attendance::{AttendanceFilter, AttendanceRecord, AttendanceTotals, NewAttendance},
    audit::{EventFilter, LoginAttempt, NewLoginAttempt, NewSecurityEvent, SecurityEvent},
    user::{LoginState, NewUser, ProfileUpdate, User, UserStats},
};

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

#[derive(Debug, Display)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; carries the field it guards
    #[display(fmt = "duplicate {}", _0)]
    Duplicate(&'static str),

    #[display(fmt = "database error: {}", _0)]
    Database(String),
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for every server-owned entity.
///
/// Uniqueness of usernames, emails and (user, work date) attendance rows is enforced
/// by the implementation, not by callers, so racing writers get [`StoreError::Duplicate`]
/// instead of duplicate rows.
#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user(&self, id: u64) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    /// Returns the name of the first taken identity field, if any
    async fn identity_taken(&self, username: &str, email: &str)
    -> StoreResult<Option<&'static str>>;
    async fn save_login_state(&self, user_id: u64, state: &LoginState) -> StoreResult<()>;
    /// Applies one failed login to the stored counters as a single atomic step and
    /// returns the new state; `None` when the user does not exist
    async fn record_login_failure(
        &self,
        user_id: u64,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<LoginState>>;
    async fn set_face_reference(&self, user_id: u64, reference: &[u8]) -> StoreResult<()>;
    async fn set_totp(&self, user_id: u64, secret: &str, enabled: bool) -> StoreResult<()>;
    async fn update_profile(&self, user_id: u64, update: &ProfileUpdate) -> StoreResult<bool>;
    async fn set_active(&self, user_id: u64, active: bool) -> StoreResult<bool>;
    async fn set_admin(&self, username: &str, admin: bool) -> StoreResult<bool>;
    async fn list_users(&self, offset: u32, limit: u32) -> StoreResult<Vec<User>>;
    async fn user_stats(&self, now: DateTime<Utc>) -> StoreResult<UserStats>;

    // attendance
    async fn insert_attendance(&self, record: NewAttendance) -> StoreResult<AttendanceRecord>;
    async fn find_attendance(&self, id: u64) -> StoreResult<Option<AttendanceRecord>>;
    async fn attendance_on(&self, user_id: u64, day: NaiveDate)
    -> StoreResult<Option<AttendanceRecord>>;
    /// Closes an open record; false when it was already closed or does not exist
    async fn close_attendance(
        &self,
        id: u64,
        check_out_time: DateTime<Utc>,
        work_duration: f64,
    ) -> StoreResult<bool>;
    async fn list_attendance(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceRecord>>;
    async fn count_checkins_on(&self, day: NaiveDate) -> StoreResult<i64>;
    /// Aggregates over every row of the user with `start <= work_date <= end`
    async fn attendance_totals(
        &self,
        user_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<AttendanceTotals>;

    // audit
    async fn insert_login_attempt(&self, attempt: NewLoginAttempt) -> StoreResult<()>;
    async fn insert_security_event(&self, event: NewSecurityEvent) -> StoreResult<()>;
    async fn list_login_attempts(&self, user_id: Option<u64>, limit: u32)
    -> StoreResult<Vec<LoginAttempt>>;
    async fn list_security_events(&self, filter: &EventFilter) -> StoreResult<Vec<SecurityEvent>>;
}
