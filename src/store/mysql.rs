use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{MySql, MySqlPool, QueryBuilder};

use super::{Store, StoreError, StoreResult};
use crate::auth::lockout::LockoutPolicy;
use crate::model::{
    attendance::{AttendanceFilter, AttendanceRecord, AttendanceTotals, NewAttendance},
    audit::{EventFilter, LoginAttempt, NewLoginAttempt, NewSecurityEvent, SecurityEvent},
    user::{LoginState, NewUser, ProfileUpdate, User, UserStats},
};
use crate::utils::db_utils::{SqlValue, build_update_sql, execute_update};

const USER_COLUMNS: &str = r#"
    id, username, email, password_hash, full_name, phone_number,
    face_reference, face_registered, totp_secret, totp_enabled,
    failed_login_attempts, last_failed_login_at, locked_until,
    is_active, is_admin, created_at, updated_at
"#;

const ATTENDANCE_COLUMNS: &str = r#"
    id, user_id, work_date, check_in_time, check_out_time, work_duration,
    location, face_verified, face_image, ip_address, user_agent, created_at
"#;

const PROFILE_COLUMNS: &[&str] = &["full_name", "email", "phone_number"];

/// MySQL `ER_DUP_ENTRY`. Other SQLSTATE 23000 errors (foreign keys, NOT NULL) are not duplicates.
const ER_DUP_ENTRY: u16 = 1062;

/// Field guarded by the unique key named in a duplicate-entry error, if it is one.
fn duplicate_field(error_number: u16, message: &str) -> Option<&'static str> {
    if error_number != ER_DUP_ENTRY {
        return None;
    }
    Some(if message.contains("uq_users_username") {
        "username"
    } else if message.contains("uq_users_email") {
        "email"
    } else if message.contains("uq_attendance_user_day") {
        "attendance"
    } else {
        "record"
    })
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if let Some(field) = db_err
                .try_downcast_ref::<MySqlDatabaseError>()
                .and_then(|my| duplicate_field(my.number(), my.message()))
            {
                return StoreError::Duplicate(field);
            }
        }
        StoreError::Database(e.to_string())
    }
}

/// Production backend; schema lives in `migrations/`.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn count(&self, sql: &str) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool).await?)
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, full_name, phone_number, is_admin)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.phone_number)
        .bind(user.is_admin)
        .execute(&self.pool)
        .await?;

        self.find_user(result.last_insert_id())
            .await?
            .ok_or_else(|| StoreError::Database("inserted user vanished".into()))
    }

    async fn find_user(&self, id: u64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn identity_taken(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<&'static str>> {
        // EXISTS comes back as BIGINT on MySQL
        let (username_taken, email_taken) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                EXISTS(SELECT 1 FROM users WHERE username = ? LIMIT 1),
                EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(if username_taken > 0 {
            Some("username")
        } else if email_taken > 0 {
            Some("email")
        } else {
            None
        })
    }

    async fn save_login_state(&self, user_id: u64, state: &LoginState) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = ?, last_failed_login_at = ?, locked_until = ?
            WHERE id = ?
            "#,
        )
        .bind(state.failed_login_attempts)
        .bind(state.last_failed_login_at)
        .bind(state.locked_until)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: u64,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<LoginState>> {
        let mut tx = self.pool.begin().await?;

        // row lock serializes concurrent failures for the same user
        let current = sqlx::query_as::<_, (u32, Option<DateTime<Utc>>, Option<DateTime<Utc>>)>(
            r#"
            SELECT failed_login_attempts, last_failed_login_at, locked_until
            FROM users WHERE id = ? FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((failed_login_attempts, last_failed_login_at, locked_until)) = current else {
            tx.rollback().await?;
            return Ok(None);
        };

        let next = policy.record_failure(
            &LoginState { failed_login_attempts, last_failed_login_at, locked_until },
            now,
        );
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = ?, last_failed_login_at = ?, locked_until = ?
            WHERE id = ?
            "#,
        )
        .bind(next.failed_login_attempts)
        .bind(next.last_failed_login_at)
        .bind(next.locked_until)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(next))
    }

    async fn set_face_reference(&self, user_id: u64, reference: &[u8]) -> StoreResult<()> {
        sqlx::query("UPDATE users SET face_reference = ?, face_registered = TRUE WHERE id = ?")
            .bind(reference)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_totp(&self, user_id: u64, secret: &str, enabled: bool) -> StoreResult<()> {
        sqlx::query("UPDATE users SET totp_secret = ?, totp_enabled = ? WHERE id = ?")
            .bind(secret)
            .bind(enabled)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_profile(&self, user_id: u64, update: &ProfileUpdate) -> StoreResult<bool> {
        let mut fields = Vec::new();
        if let Some(full_name) = &update.full_name {
            fields.push(("full_name", SqlValue::String(full_name.clone())));
        }
        if let Some(email) = &update.email {
            fields.push(("email", SqlValue::String(email.clone())));
        }
        if let Some(phone) = &update.phone_number {
            // an empty phone number clears the column
            let phone = Some(phone.clone()).filter(|p| !p.is_empty());
            fields.push(("phone_number", SqlValue::from(phone)));
        }

        let update = build_update_sql("users", fields, PROFILE_COLUMNS, "id", user_id)?;
        let affected = execute_update(&self.pool, update).await?;
        Ok(affected > 0)
    }

    async fn set_active(&self, user_id: u64, active: bool) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_admin(&self, username: &str, admin: bool) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET is_admin = ? WHERE username = ?")
            .bind(admin)
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self, offset: u32, limit: u32) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT ? OFFSET ?");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn user_stats(&self, now: DateTime<Utc>) -> StoreResult<UserStats> {
        let locked_users =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE locked_until > ?")
                .bind(now)
                .fetch_one(&self.pool)
                .await?;

        Ok(UserStats {
            total_users: self.count("SELECT COUNT(*) FROM users").await?,
            active_users: self.count("SELECT COUNT(*) FROM users WHERE is_active").await?,
            locked_users,
            users_with_face: self
                .count("SELECT COUNT(*) FROM users WHERE face_registered")
                .await?,
            users_with_totp: self
                .count("SELECT COUNT(*) FROM users WHERE totp_enabled")
                .await?,
        })
    }

    async fn insert_attendance(&self, record: NewAttendance) -> StoreResult<AttendanceRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records
            (user_id, work_date, check_in_time, location, face_verified, face_image, ip_address, user_agent)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.user_id)
        .bind(record.work_date)
        .bind(record.check_in_time)
        .bind(&record.location)
        .bind(record.face_verified)
        .bind(&record.face_image)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .execute(&self.pool)
        .await?;

        self.find_attendance(result.last_insert_id())
            .await?
            .ok_or_else(|| StoreError::Database("inserted attendance vanished".into()))
    }

    async fn find_attendance(&self, id: u64) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance_records WHERE id = ?");
        Ok(sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn attendance_on(
        &self,
        user_id: u64,
        day: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance_records WHERE user_id = ? AND work_date = ?"
        );
        Ok(sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(user_id)
            .bind(day)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn close_attendance(
        &self,
        id: u64,
        check_out_time: DateTime<Utc>,
        work_duration: f64,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_records
            SET check_out_time = ?, work_duration = ?
            WHERE id = ?
            AND check_out_time IS NULL
            "#,
        )
        .bind(check_out_time)
        .bind(work_duration)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_attendance(
        &self,
        filter: &AttendanceFilter,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let mut qb: QueryBuilder<MySql> = QueryBuilder::new(format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance_records WHERE 1 = 1"
        ));

        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(from) = filter.from {
            qb.push(" AND check_in_time >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND check_in_time <= ").push_bind(to);
        }

        qb.push(" ORDER BY check_in_time DESC LIMIT ")
            .push_bind(filter.limit as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset as i64);

        Ok(qb
            .build_query_as::<AttendanceRecord>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_checkins_on(&self, day: NaiveDate) -> StoreResult<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM attendance_records WHERE work_date = ?",
            )
            .bind(day)
            .fetch_one(&self.pool)
            .await?,
        )
    }

    async fn attendance_totals(
        &self,
        user_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<AttendanceTotals> {
        let (total_days, completed_days, verified_count, total_hours) =
            sqlx::query_as::<_, (i64, i64, i64, f64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(DISTINCT CASE WHEN check_out_time IS NOT NULL THEN work_date END),
                    CAST(COALESCE(SUM(face_verified), 0) AS SIGNED),
                    CAST(COALESCE(SUM(work_duration), 0) AS DOUBLE)
                FROM attendance_records
                WHERE user_id = ? AND work_date BETWEEN ? AND ?
                "#,
            )
            .bind(user_id)
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;

        Ok(AttendanceTotals {
            total_days: total_days as u32,
            completed_days: completed_days as u32,
            verified_count: verified_count as u32,
            total_hours,
        })
    }

    async fn insert_login_attempt(&self, attempt: NewLoginAttempt) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts
            (user_id, username, ip_address, user_agent, success, failure_reason, attempted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.user_id)
        .bind(&attempt.username)
        .bind(&attempt.ip_address)
        .bind(&attempt.user_agent)
        .bind(attempt.success)
        .bind(attempt.failure_reason)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_security_event(&self, event: NewSecurityEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO security_events
            (user_id, event_type, description, ip_address, severity, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.user_id)
        .bind(event.event_type.to_string())
        .bind(&event.description)
        .bind(&event.ip_address)
        .bind(event.severity.to_string())
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_login_attempts(
        &self,
        user_id: Option<u64>,
        limit: u32,
    ) -> StoreResult<Vec<LoginAttempt>> {
        let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
            r#"
            SELECT id, user_id, username, ip_address, user_agent, success, failure_reason, attempted_at
            FROM login_attempts
            "#,
        );
        if let Some(user_id) = user_id {
            qb.push(" WHERE user_id = ").push_bind(user_id);
        }
        qb.push(" ORDER BY attempted_at DESC LIMIT ")
            .push_bind(limit as i64);

        Ok(qb
            .build_query_as::<LoginAttempt>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_security_events(&self, filter: &EventFilter) -> StoreResult<Vec<SecurityEvent>> {
        let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
            r#"
            SELECT id, user_id, event_type, description, ip_address, severity, occurred_at
            FROM security_events
            WHERE 1 = 1
            "#,
        );
        if let Some(event_type) = &filter.event_type {
            qb.push(" AND event_type = ").push_bind(event_type.clone());
        }
        if let Some(severity) = &filter.severity {
            qb.push(" AND severity = ").push_bind(severity.clone());
        }
        qb.push(" ORDER BY occurred_at DESC LIMIT ")
            .push_bind(filter.limit as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset as i64);

        Ok(qb
            .build_query_as::<SecurityEvent>()
            .fetch_all(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_duplicate_entries_map_to_duplicate() {
        assert_eq!(
            duplicate_field(1062, "Duplicate entry 'alice' for key 'users.uq_users_username'"),
            Some("username")
        );
        assert_eq!(
            duplicate_field(1062, "Duplicate entry '7-2026-01-05' for key 'attendance_records.uq_attendance_user_day'"),
            Some("attendance")
        );
        assert_eq!(duplicate_field(1062, "Duplicate entry 'x' for key 'PRIMARY'"), Some("record"));

        // same SQLSTATE 23000, different failures
        assert_eq!(
            duplicate_field(1452, "Cannot add or update a child row: a foreign key constraint fails (`fk_attendance_user`)"),
            None
        );
        assert_eq!(duplicate_field(1048, "Column 'username' cannot be null"), None);
    }
}
