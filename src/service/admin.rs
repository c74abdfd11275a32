use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::{auth::ClientInfo, lockout::LockoutPolicy},
    error::ServiceError,
    model::{
        attendance::{AttendanceFilter, AttendanceRecord},
        audit::{EventFilter, EventType, LoginAttempt, SecurityEvent, Severity},
        user::{User, UserStats, UserSummary},
    },
    service::audit,
    store::Store,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceStats {
    pub today_checkins: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminDashboard {
    pub user_stats: UserStats,
    pub attendance_stats: AttendanceStats,
    pub recent_events: Vec<SecurityEvent>,
    pub recent_logins: Vec<LoginAttempt>,
}

pub async fn dashboard(store: &dyn Store, now: DateTime<Utc>) -> Result<AdminDashboard, ServiceError> {
    Ok(AdminDashboard {
        user_stats: store.user_stats(now).await?,
        attendance_stats: AttendanceStats {
            today_checkins: store.count_checkins_on(now.date_naive()).await?,
        },
        recent_events: store
            .list_security_events(&EventFilter { limit: 10, ..Default::default() })
            .await?,
        recent_logins: store.list_login_attempts(None, 10).await?,
    })
}

pub async fn list_users(
    store: &dyn Store,
    offset: u32,
    limit: u32,
) -> Result<Vec<UserSummary>, ServiceError> {
    Ok(store
        .list_users(offset, limit)
        .await?
        .iter()
        .map(UserSummary::from)
        .collect())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserDetail {
    pub user: UserSummary,
    #[schema(value_type = Option<String>)]
    pub updated_at: Option<DateTime<Utc>>,
    pub recent_attendance: Vec<AttendanceRecord>,
    pub recent_logins: Vec<LoginAttempt>,
}

async fn existing_user(store: &dyn Store, user_id: u64) -> Result<User, ServiceError> {
    store
        .find_user(user_id)
        .await?
        .ok_or(ServiceError::NotFound("User"))
}

pub async fn user_detail(store: &dyn Store, user_id: u64) -> Result<UserDetail, ServiceError> {
    let user = existing_user(store, user_id).await?;

    let recent_attendance = store
        .list_attendance(&AttendanceFilter {
            user_id: Some(user_id),
            limit: 10,
            ..Default::default()
        })
        .await?
        .into_iter()
        .map(AttendanceRecord::without_image)
        .collect();

    Ok(UserDetail {
        user: UserSummary::from(&user),
        updated_at: user.updated_at,
        recent_attendance,
        recent_logins: store.list_login_attempts(Some(user_id), 10).await?,
    })
}

/// Flips `is_active`; returns the new value. Admins cannot deactivate themselves.
pub async fn toggle_active(
    store: &dyn Store,
    admin: &User,
    user_id: u64,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<bool, ServiceError> {
    let user = existing_user(store, user_id).await?;
    if user.id == admin.id && user.is_active {
        return Err(ServiceError::Validation(
            "You cannot deactivate your own account".into(),
        ));
    }

    let active = !user.is_active;
    if !store.set_active(user_id, active).await? {
        return Err(ServiceError::NotFound("User"));
    }

    let (event_type, verb) = if active {
        (EventType::UserActivated, "activated")
    } else {
        (EventType::UserDeactivated, "deactivated")
    };
    info!(admin_id = admin.id, user_id, active, "User {}", verb);
    audit::record_event(
        store,
        Some(user_id),
        event_type,
        Severity::Warning,
        format!("User {} by admin {}", verb, admin.username),
        client,
        now,
    )
    .await;

    Ok(active)
}

pub async fn unlock(
    store: &dyn Store,
    policy: &LockoutPolicy,
    admin: &User,
    user_id: u64,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    existing_user(store, user_id).await?;
    store.save_login_state(user_id, &policy.record_success()).await?;

    info!(admin_id = admin.id, user_id, "User unlocked");
    audit::record_event(
        store,
        Some(user_id),
        EventType::UserUnlocked,
        Severity::Info,
        format!("Account unlocked by admin {}", admin.username),
        client,
        now,
    )
    .await;
    Ok(())
}

/// Who a row belongs to, for admin listings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserRef {
    pub id: u64,
    pub username: String,
    pub full_name: String,
}

async fn resolve_users(
    store: &dyn Store,
    ids: impl Iterator<Item = u64>,
) -> Result<HashMap<u64, UserRef>, ServiceError> {
    let mut users = HashMap::new();
    for id in ids {
        if users.contains_key(&id) {
            continue;
        }
        if let Some(u) = store.find_user(id).await? {
            users.insert(
                id,
                UserRef {
                    id,
                    username: u.username,
                    full_name: u.full_name,
                },
            );
        }
    }
    Ok(users)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceRow {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub user: Option<UserRef>,
}

pub async fn list_attendance(
    store: &dyn Store,
    filter: &AttendanceFilter,
) -> Result<Vec<AttendanceRow>, ServiceError> {
    let records = store.list_attendance(filter).await?;
    let users = resolve_users(store, records.iter().map(|r| r.user_id)).await?;

    Ok(records
        .into_iter()
        .map(|r| AttendanceRow {
            user: users.get(&r.user_id).cloned(),
            record: r.without_image(),
        })
        .collect())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SecurityEventRow {
    #[serde(flatten)]
    pub event: SecurityEvent,
    pub user: Option<UserRef>,
}

pub async fn list_security_events(
    store: &dyn Store,
    filter: &EventFilter,
) -> Result<Vec<SecurityEventRow>, ServiceError> {
    let events = store.list_security_events(filter).await?;
    let users = resolve_users(store, events.iter().filter_map(|e| e.user_id)).await?;

    Ok(events
        .into_iter()
        .map(|e| SecurityEventRow {
            user: e.user_id.and_then(|id| users.get(&id).cloned()),
            event: e,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        model::user::LoginState,
        service::testing::{seed_user, t0},
        store::MemoryStore,
    };
    use chrono::Duration;

    #[actix_web::test]
    async fn toggle_flips_and_guards_self() {
        let store = MemoryStore::new();
        let client = ClientInfo::default();
        let admin = seed_user(&store, "adm_root").await;
        let user = seed_user(&store, "adm_user").await;

        assert!(!toggle_active(&store, &admin, user.id, &client, t0()).await.unwrap());
        assert!(toggle_active(&store, &admin, user.id, &client, t0()).await.unwrap());

        let err = toggle_active(&store, &admin, admin.id, &client, t0()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = toggle_active(&store, &admin, 999, &client, t0()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[actix_web::test]
    async fn unlock_clears_lockout() {
        let store = MemoryStore::new();
        let policy = LockoutPolicy::from_config(&Config::for_tests());
        let admin = seed_user(&store, "adm_root2").await;
        let user = seed_user(&store, "adm_locked").await;
        store
            .save_login_state(
                user.id,
                &LoginState {
                    failed_login_attempts: 5,
                    last_failed_login_at: Some(t0()),
                    locked_until: Some(t0() + Duration::minutes(15)),
                },
            )
            .await
            .unwrap();
        assert_eq!(dashboard(&store, t0()).await.unwrap().user_stats.locked_users, 1);

        unlock(&store, &policy, &admin, user.id, &ClientInfo::default(), t0())
            .await
            .unwrap();

        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert!(!user.is_locked(t0()));
        assert_eq!(user.failed_login_attempts, 0);

        let events = list_security_events(
            &store,
            &EventFilter { event_type: Some("user_unlocked".into()), limit: 5, ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user.as_ref().map(|u| u.username.as_str()), Some("adm_locked"));
    }
}
