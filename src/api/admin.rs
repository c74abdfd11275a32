use crate::{
    auth::{
        auth::{AuthUser, ClientInfo},
        lockout::LockoutPolicy,
    },
    config::Config,
    error::ServiceError,
    model::{attendance::AttendanceFilter, audit::EventFilter},
    models::{AdminAttendanceQuery, DEFAULT_PAGE, EventQuery, MessageResponse, PageQuery, page_limit},
    service::{
        admin,
        reporting::DateRange,
    },
    store::Store,
};
use actix_web::{HttpResponse, web};
use chrono::Utc;

#[utoipa::path(
    get,
    path = "/api/admin/dashboard",
    responses(
        (status = 200, description = "User and attendance statistics", body = admin::AdminDashboard),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn dashboard(
    auth: AuthUser,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    auth.require_admin()?;
    let dashboard = admin::dashboard(store.get_ref(), Utc::now()).await?;
    Ok(HttpResponse::Ok().json(dashboard))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(PageQuery),
    responses(
        (status = 200, description = "Users page", body = [crate::model::user::UserSummary]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_users(
    auth: AuthUser,
    query: web::Query<PageQuery>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    auth.require_admin()?;
    let users = admin::list_users(
        store.get_ref(),
        query.skip.unwrap_or(0),
        page_limit(query.limit, DEFAULT_PAGE),
    )
    .await?;
    Ok(HttpResponse::Ok().json(users))
}

#[utoipa::path(
    get,
    path = "/api/admin/users/{id}",
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "User with recent attendance and logins", body = admin::UserDetail),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_user(
    auth: AuthUser,
    path: web::Path<u64>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    auth.require_admin()?;
    let detail = admin::user_detail(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Toggles the user between active and inactive.
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/activate",
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "New state", body = MessageResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn activate_user(
    auth: AuthUser,
    path: web::Path<u64>,
    client: ClientInfo,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    auth.require_admin()?;
    let active =
        admin::toggle_active(store.get_ref(), &auth.user, path.into_inner(), &client, Utc::now())
            .await?;

    let status_text = if active { "activated" } else { "deactivated" };
    Ok(HttpResponse::Ok().json(MessageResponse::new(format!(
        "User {} successfully",
        status_text
    ))))
}

#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/unlock",
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "Lockout cleared", body = MessageResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn unlock_user(
    auth: AuthUser,
    path: web::Path<u64>,
    client: ClientInfo,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ServiceError> {
    auth.require_admin()?;
    admin::unlock(
        store.get_ref(),
        &LockoutPolicy::from_config(&config),
        &auth.user,
        path.into_inner(),
        &client,
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("User unlocked successfully")))
}

#[utoipa::path(
    get,
    path = "/api/admin/attendance",
    params(AdminAttendanceQuery),
    responses(
        (status = 200, description = "Attendance across users, newest first", body = [admin::AttendanceRow]),
        (status = 400, description = "Invalid date range"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_attendance(
    auth: AuthUser,
    query: web::Query<AdminAttendanceQuery>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    auth.require_admin()?;

    let (from, to) = match (query.start_date, query.end_date) {
        (Some(start), Some(end)) => {
            let (from, to) = DateRange::new(start, end)?.bounds();
            (Some(from), Some(to))
        }
        (start, end) => (
            start.map(|d| DateRange::new(d, d).map(|r| r.bounds().0)).transpose()?,
            end.map(|d| DateRange::new(d, d).map(|r| r.bounds().1)).transpose()?,
        ),
    };

    let rows = admin::list_attendance(
        store.get_ref(),
        &AttendanceFilter {
            user_id: query.user_id,
            from,
            to,
            offset: query.skip.unwrap_or(0),
            limit: page_limit(query.limit, DEFAULT_PAGE),
        },
    )
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/admin/security-events",
    params(EventQuery),
    responses(
        (status = 200, description = "Security events, newest first", body = [admin::SecurityEventRow]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn security_events(
    auth: AuthUser,
    query: web::Query<EventQuery>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    auth.require_admin()?;
    let query = query.into_inner();

    let rows = admin::list_security_events(
        store.get_ref(),
        &EventFilter {
            event_type: query.event_type.filter(|s| !s.is_empty()),
            severity: query.severity.filter(|s| !s.is_empty()),
            offset: query.skip.unwrap_or(0),
            limit: page_limit(query.limit, DEFAULT_PAGE),
        },
    )
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}
