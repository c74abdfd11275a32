use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{Store, StoreError, StoreResult};
use crate::auth::lockout::LockoutPolicy;
use crate::model::{
    attendance::{AttendanceFilter, AttendanceRecord, AttendanceTotals, NewAttendance},
    audit::{EventFilter, LoginAttempt, NewLoginAttempt, NewSecurityEvent, SecurityEvent},
    user::{LoginState, NewUser, ProfileUpdate, User, UserStats},
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    attendance: Vec<AttendanceRecord>,
    login_attempts: Vec<LoginAttempt>,
    security_events: Vec<SecurityEvent>,
}

/// In-process backend selected with `DATABASE_URL=memory://`.
///
/// Same uniqueness rules as the MySQL schema: usernames and emails compare
/// case-insensitively, and one attendance row per user per work date.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Database("memory store poisoned".into()))
    }
}

fn page<T: Clone>(rows: impl Iterator<Item = T>, offset: u32, limit: u32) -> Vec<T> {
    rows.skip(offset as usize).take(limit as usize).collect()
}

fn count_where(users: &[User], pred: impl Fn(&User) -> bool) -> i64 {
    users.iter().filter(|u| pred(u)).count() as i64
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut t = self.tables()?;

        if t.users.iter().any(|u| u.username.eq_ignore_ascii_case(&user.username)) {
            return Err(StoreError::Duplicate("username"));
        }
        if t.users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Duplicate("email"));
        }

        let row = User {
            id: t.users.len() as u64 + 1,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            phone_number: user.phone_number,
            face_reference: None,
            face_registered: false,
            totp_secret: None,
            totp_enabled: false,
            failed_login_attempts: 0,
            last_failed_login_at: None,
            locked_until: None,
            is_active: true,
            is_admin: user.is_admin,
            created_at: Utc::now(),
            updated_at: None,
        };
        t.users.push(row.clone());
        Ok(row)
    }

    async fn find_user(&self, id: u64) -> StoreResult<Option<User>> {
        Ok(self.tables()?.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables()?
            .users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn identity_taken(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<&'static str>> {
        let t = self.tables()?;
        if t.users.iter().any(|u| u.username.eq_ignore_ascii_case(username)) {
            return Ok(Some("username"));
        }
        if t.users.iter().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Ok(Some("email"));
        }
        Ok(None)
    }

    async fn save_login_state(&self, user_id: u64, state: &LoginState) -> StoreResult<()> {
        let mut t = self.tables()?;
        if let Some(u) = t.users.iter_mut().find(|u| u.id == user_id) {
            u.failed_login_attempts = state.failed_login_attempts;
            u.last_failed_login_at = state.last_failed_login_at;
            u.locked_until = state.locked_until;
        }
        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: u64,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<LoginState>> {
        let mut t = self.tables()?;
        let Some(u) = t.users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(None);
        };
        let next = policy.record_failure(&u.login_state(), now);
        u.failed_login_attempts = next.failed_login_attempts;
        u.last_failed_login_at = next.last_failed_login_at;
        u.locked_until = next.locked_until;
        Ok(Some(next))
    }

    async fn set_face_reference(&self, user_id: u64, reference: &[u8]) -> StoreResult<()> {
        let mut t = self.tables()?;
        if let Some(u) = t.users.iter_mut().find(|u| u.id == user_id) {
            u.face_reference = Some(reference.to_vec());
            u.face_registered = true;
            u.updated_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn set_totp(&self, user_id: u64, secret: &str, enabled: bool) -> StoreResult<()> {
        let mut t = self.tables()?;
        if let Some(u) = t.users.iter_mut().find(|u| u.id == user_id) {
            u.totp_secret = Some(secret.to_string());
            u.totp_enabled = enabled;
            u.updated_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_profile(&self, user_id: u64, update: &ProfileUpdate) -> StoreResult<bool> {
        let mut t = self.tables()?;

        if let Some(email) = &update.email {
            if t
                .users
                .iter()
                .any(|u| u.id != user_id && u.email.eq_ignore_ascii_case(email))
            {
                return Err(StoreError::Duplicate("email"));
            }
        }

        let Some(u) = t.users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(false);
        };
        if let Some(full_name) = &update.full_name {
            u.full_name = full_name.clone();
        }
        if let Some(email) = &update.email {
            u.email = email.clone();
        }
        if let Some(phone) = &update.phone_number {
            u.phone_number = Some(phone.clone()).filter(|p| !p.is_empty());
        }
        u.updated_at = Some(Utc::now());
        Ok(true)
    }

    async fn set_active(&self, user_id: u64, active: bool) -> StoreResult<bool> {
        let mut t = self.tables()?;
        Ok(match t.users.iter_mut().find(|u| u.id == user_id) {
            Some(u) => {
                u.is_active = active;
                true
            }
            None => false,
        })
    }

    async fn set_admin(&self, username: &str, admin: bool) -> StoreResult<bool> {
        let mut t = self.tables()?;
        Ok(
            match t
                .users
                .iter_mut()
                .find(|u| u.username.eq_ignore_ascii_case(username))
            {
                Some(u) => {
                    u.is_admin = admin;
                    true
                }
                None => false,
            },
        )
    }

    async fn list_users(&self, offset: u32, limit: u32) -> StoreResult<Vec<User>> {
        Ok(page(self.tables()?.users.iter().cloned(), offset, limit))
    }

    async fn user_stats(&self, now: DateTime<Utc>) -> StoreResult<UserStats> {
        let t = self.tables()?;
        let users = t.users.as_slice();
        Ok(UserStats {
            total_users: users.len() as i64,
            active_users: count_where(users, |u| u.is_active),
            locked_users: count_where(users, |u| u.is_locked(now)),
            users_with_face: count_where(users, |u| u.face_registered),
            users_with_totp: count_where(users, |u| u.totp_enabled),
        })
    }

    async fn insert_attendance(&self, record: NewAttendance) -> StoreResult<AttendanceRecord> {
        let mut t = self.tables()?;

        if t
            .attendance
            .iter()
            .any(|r| r.user_id == record.user_id && r.work_date == record.work_date)
        {
            return Err(StoreError::Duplicate("attendance"));
        }

        let row = AttendanceRecord {
            id: t.attendance.len() as u64 + 1,
            user_id: record.user_id,
            work_date: record.work_date,
            check_in_time: record.check_in_time,
            check_out_time: None,
            work_duration: None,
            location: record.location,
            face_verified: record.face_verified,
            face_image: record.face_image,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            created_at: record.check_in_time,
        };
        t.attendance.push(row.clone());
        Ok(row)
    }

    async fn find_attendance(&self, id: u64) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self.tables()?.attendance.iter().find(|r| r.id == id).cloned())
    }

    async fn attendance_on(
        &self,
        user_id: u64,
        day: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self
            .tables()?
            .attendance
            .iter()
            .find(|r| r.user_id == user_id && r.work_date == day)
            .cloned())
    }

    async fn close_attendance(
        &self,
        id: u64,
        check_out_time: DateTime<Utc>,
        work_duration: f64,
    ) -> StoreResult<bool> {
        let mut t = self.tables()?;
        Ok(
            match t.attendance.iter_mut().find(|r| r.id == id && r.is_open()) {
                Some(r) => {
                    r.check_out_time = Some(check_out_time);
                    r.work_duration = Some(work_duration);
                    true
                }
                None => false,
            },
        )
    }

    async fn list_attendance(
        &self,
        filter: &AttendanceFilter,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let t = self.tables()?;
        let mut rows: Vec<&AttendanceRecord> = t
            .attendance
            .iter()
            .filter(|r| filter.user_id.is_none_or(|id| r.user_id == id))
            .filter(|r| filter.from.is_none_or(|from| r.check_in_time >= from))
            .filter(|r| filter.to.is_none_or(|to| r.check_in_time <= to))
            .collect();
        rows.sort_by(|a, b| b.check_in_time.cmp(&a.check_in_time));
        Ok(page(rows.into_iter().cloned(), filter.offset, filter.limit))
    }

    async fn count_checkins_on(&self, day: NaiveDate) -> StoreResult<i64> {
        Ok(self
            .tables()?
            .attendance
            .iter()
            .filter(|r| r.work_date == day)
            .count() as i64)
    }

    async fn attendance_totals(
        &self,
        user_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<AttendanceTotals> {
        let t = self.tables()?;
        Ok(AttendanceTotals::tally(t.attendance.iter().filter(|r| {
            r.user_id == user_id && r.work_date >= start && r.work_date <= end
        })))
    }

    async fn insert_login_attempt(&self, attempt: NewLoginAttempt) -> StoreResult<()> {
        let mut t = self.tables()?;
        let id = t.login_attempts.len() as u64 + 1;
        t.login_attempts.push(LoginAttempt {
            id,
            user_id: attempt.user_id,
            username: Some(attempt.username),
            ip_address: attempt.ip_address,
            user_agent: attempt.user_agent,
            success: attempt.success,
            failure_reason: attempt.failure_reason.map(str::to_string),
            attempted_at: attempt.attempted_at,
        });
        Ok(())
    }

    async fn insert_security_event(&self, event: NewSecurityEvent) -> StoreResult<()> {
        let mut t = self.tables()?;
        let id = t.security_events.len() as u64 + 1;
        t.security_events.push(SecurityEvent {
            id,
            user_id: event.user_id,
            event_type: event.event_type.to_string(),
            description: event.description,
            ip_address: event.ip_address,
            severity: event.severity.to_string(),
            occurred_at: event.occurred_at,
        });
        Ok(())
    }

    async fn list_login_attempts(
        &self,
        user_id: Option<u64>,
        limit: u32,
    ) -> StoreResult<Vec<LoginAttempt>> {
        let t = self.tables()?;
        let rows = t
            .login_attempts
            .iter()
            .rev()
            .filter(|a| user_id.is_none_or(|id| a.user_id == Some(id)))
            .cloned();
        Ok(page(rows, 0, limit))
    }

    async fn list_security_events(&self, filter: &EventFilter) -> StoreResult<Vec<SecurityEvent>> {
        let t = self.tables()?;
        let rows = t
            .security_events
            .iter()
            .rev()
            .filter(|e| filter.event_type.as_ref().is_none_or(|ty| &e.event_type == ty))
            .filter(|e| filter.severity.as_ref().is_none_or(|s| &e.severity == s))
            .cloned();
        Ok(page(rows, filter.offset, filter.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            full_name: "Test User".into(),
            phone_number: None,
            is_admin: false,
        }
    }

    fn check_in(user_id: u64, at: DateTime<Utc>) -> NewAttendance {
        NewAttendance {
            user_id,
            work_date: at.date_naive(),
            check_in_time: at,
            location: None,
            face_verified: true,
            face_image: None,
            ip_address: None,
            user_agent: None,
        }
    }

    #[actix_web::test]
    async fn identities_are_unique_ignoring_case() {
        let store = MemoryStore::new();
        store.create_user(new_user("alice", "alice@example.com")).await.unwrap();

        let dup_name = store.create_user(new_user("ALICE", "other@example.com")).await;
        assert!(matches!(dup_name, Err(StoreError::Duplicate("username"))));

        let dup_mail = store.create_user(new_user("bob", "Alice@Example.com")).await;
        assert!(matches!(dup_mail, Err(StoreError::Duplicate("email"))));

        assert_eq!(store.list_users(0, 10).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn interleaved_login_failures_all_count() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("carol", "carol@example.com")).await.unwrap();
        let policy = LockoutPolicy {
            max_attempts: 5,
            window: chrono::Duration::minutes(60),
            duration: chrono::Duration::minutes(15),
        };
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();

        let states = futures::future::join_all(
            (0..8).map(|_| store.record_login_failure(user.id, &policy, now)),
        )
        .await;
        let mut counts: Vec<u32> = states
            .into_iter()
            .map(|s| s.unwrap().unwrap().failed_login_attempts)
            .collect();
        counts.sort_unstable();
        assert_eq!(counts, (1..=8).collect::<Vec<_>>());

        let stored = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 8);
        assert_eq!(stored.locked_until, Some(now + chrono::Duration::minutes(15)));

        assert!(store.record_login_failure(999, &policy, now).await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn totals_cover_only_the_users_work_dates() {
        let store = MemoryStore::new();
        let monday = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();

        let first = store.insert_attendance(check_in(1, monday)).await.unwrap();
        store
            .close_attendance(first.id, monday + chrono::Duration::hours(8), 8.0)
            .await
            .unwrap();
        let mut unverified = check_in(1, monday + chrono::Duration::days(1));
        unverified.face_verified = false;
        store.insert_attendance(unverified).await.unwrap();
        // other user, and a day past the range
        store.insert_attendance(check_in(2, monday)).await.unwrap();
        store
            .insert_attendance(check_in(1, monday + chrono::Duration::days(7)))
            .await
            .unwrap();

        let start = monday.date_naive();
        let totals = store
            .attendance_totals(1, start, start + chrono::Days::new(6))
            .await
            .unwrap();
        assert_eq!(
            totals,
            AttendanceTotals { total_days: 2, completed_days: 1, verified_count: 1, total_hours: 8.0 }
        );
    }

    #[actix_web::test]
    async fn one_attendance_row_per_user_per_day() {
        let store = MemoryStore::new();
        let nine = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();

        store.insert_attendance(check_in(1, nine)).await.unwrap();
        let second = store
            .insert_attendance(check_in(1, nine + chrono::Duration::hours(2)))
            .await;
        assert!(matches!(second, Err(StoreError::Duplicate("attendance"))));

        // other users and other days are unaffected
        store.insert_attendance(check_in(2, nine)).await.unwrap();
        store
            .insert_attendance(check_in(1, nine + chrono::Duration::days(1)))
            .await
            .unwrap();
    }

    #[actix_web::test]
    async fn records_close_exactly_once() {
        let store = MemoryStore::new();
        let nine = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let rec = store.insert_attendance(check_in(1, nine)).await.unwrap();

        let out = nine + chrono::Duration::hours(8);
        assert!(store.close_attendance(rec.id, out, 8.0).await.unwrap());
        assert!(!store.close_attendance(rec.id, out, 9.0).await.unwrap());

        let stored = store.find_attendance(rec.id).await.unwrap().unwrap();
        assert_eq!(stored.work_duration, Some(8.0));
    }
}
