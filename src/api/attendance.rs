use crate::{
    auth::auth::{AuthUser, ClientInfo},
    config::Config,
    error::ServiceError,
    face::FaceMatcher,
    model::attendance::{AttendanceFilter, AttendanceRecord},
    models::{CheckInReq, CheckOutReq, MonthQuery, RecordsQuery, SummaryQuery, page_limit},
    service::{
        attendance,
        face_gate::{Capture, FaceGate},
        reporting::{self, DateRange, Period},
    },
    store::Store,
};
use actix_web::{HttpResponse, web};
use chrono::{Days, Utc};
use serde_json::json;

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/checkin",
    request_body = CheckInReq,
    responses(
        (status = 200, description = "Checked in", body = Object, example = json!({
            "message": "Checked in successfully",
            "attendance_id": 1,
            "check_in_time": "2026-03-02T09:00:00Z"
        })),
        (status = 400, description = "Face recognition not set up"),
        (status = 401, description = "Face verification failed"),
        (status = 409, description = "Already checked in today"),
        (status = 422, description = "Image missing, malformed or without a face")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    req: web::Json<CheckInReq>,
    client: ClientInfo,
    store: web::Data<dyn Store>,
    matcher: web::Data<dyn FaceMatcher>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ServiceError> {
    let req = req.into_inner();
    let gate = FaceGate {
        store: store.get_ref(),
        matcher: matcher.get_ref(),
        max_image_bytes: config.max_image_bytes,
    };
    let capture = Capture {
        data_url: &req.face_image,
        face_detected: req.face_detected,
    };

    let record =
        attendance::check_in(&gate, &auth.user, capture, req.location, &client, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Checked in successfully",
        "attendance_id": record.id,
        "check_in_time": record.check_in_time,
        "record": record,
    })))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/checkout",
    request_body(content = CheckOutReq, description = "Optional; defaults to today's record"),
    responses(
        (status = 200, description = "Checked out", body = Object, example = json!({
            "message": "Checked out successfully",
            "attendance_id": 1,
            "work_duration": 8.5
        })),
        (status = 400, description = "No active check-in record found"),
        (status = 409, description = "Already checked out")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    req: Option<web::Json<CheckOutReq>>,
    client: ClientInfo,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    let attendance_id = req.and_then(|r| r.attendance_id);
    let record =
        attendance::check_out(store.get_ref(), &auth.user, attendance_id, &client, Utc::now())
            .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Checked out successfully",
        "attendance_id": record.id,
        "check_out_time": record.check_out_time,
        "work_duration": record.work_duration,
        "record": record,
    })))
}

#[utoipa::path(
    get,
    path = "/api/attendance/today-status",
    responses((status = 200, description = "Today's state", body = attendance::TodayStatus)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today_status(
    auth: AuthUser,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    let status = attendance::today_status(store.get_ref(), &auth.user, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// Own records, newest first. Defaults to the last 30 records.
#[utoipa::path(
    get,
    path = "/api/attendance/records",
    params(RecordsQuery),
    responses(
        (status = 200, description = "Attendance records", body = [AttendanceRecord]),
        (status = 400, description = "Invalid date range")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn records(
    auth: AuthUser,
    query: web::Query<RecordsQuery>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    let limit = page_limit(query.limit, 30);
    let today = Utc::now().date_naive();

    let rows = match (query.start_date, query.end_date) {
        (None, None) => {
            store
                .list_attendance(&AttendanceFilter {
                    user_id: Some(auth.user_id),
                    limit,
                    ..Default::default()
                })
                .await?
        }
        (start, end) => {
            let end = end.unwrap_or(today);
            let start = start.unwrap_or(end.checked_sub_days(Days::new(30)).unwrap_or(end));
            let range = DateRange::new(start, end)?;
            reporting::records_in(store.get_ref(), auth.user_id, range, limit).await?
        }
    };

    let rows: Vec<AttendanceRecord> = rows.into_iter().map(AttendanceRecord::without_image).collect();
    Ok(HttpResponse::Ok().json(rows))
}

fn summary_range(query: &SummaryQuery) -> Result<DateRange, ServiceError> {
    match (query.start_date, query.end_date) {
        (Some(start), Some(end)) => DateRange::new(start, end),
        (None, None) => Ok(DateRange::containing(
            query.period.unwrap_or(Period::Month),
            Utc::now().date_naive(),
        )),
        _ => Err(ServiceError::Validation(
            "start_date and end_date must be given together".into(),
        )),
    }
}

#[utoipa::path(
    get,
    path = "/api/attendance/summary",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Aggregated attendance", body = reporting::AttendanceSummary),
        (status = 400, description = "Invalid date range")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn summary(
    auth: AuthUser,
    query: web::Query<SummaryQuery>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    let range = summary_range(&query)?;
    let summary = reporting::summary(store.get_ref(), auth.user_id, range).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[utoipa::path(
    get,
    path = "/api/attendance/monthly-summary",
    params(MonthQuery),
    responses(
        (status = 200, description = "Month summary with daily records", body = reporting::MonthlySummary),
        (status = 400, description = "Invalid month")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn monthly_summary(
    auth: AuthUser,
    query: web::Query<MonthQuery>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    let monthly = reporting::monthly(store.get_ref(), auth.user_id, query.year, query.month).await?;
    Ok(HttpResponse::Ok().json(monthly))
}

#[utoipa::path(
    get,
    path = "/api/attendance/dashboard",
    responses((status = 200, description = "Today, week, month and recent records", body = reporting::Dashboard)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn dashboard(
    auth: AuthUser,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    let dashboard = reporting::dashboard(store.get_ref(), &auth.user, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(dashboard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn summary_range_needs_both_dates_or_neither() {
        let explicit = SummaryQuery { start_date: Some(date(2)), end_date: Some(date(6)), period: None };
        assert_eq!(summary_range(&explicit).unwrap().end_date, date(6));

        let half = SummaryQuery { start_date: Some(date(2)), end_date: None, period: None };
        assert!(summary_range(&half).is_err());

        let reversed = SummaryQuery { start_date: Some(date(6)), end_date: Some(date(2)), period: None };
        assert!(summary_range(&reversed).is_err());

        let today = SummaryQuery { start_date: None, end_date: None, period: Some(Period::Day) };
        let range = summary_range(&today).unwrap();
        assert_eq!(range.start_date, range.end_date);
    }
}
