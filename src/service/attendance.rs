use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::auth::ClientInfo,
    error::ServiceError,
    model::{
        attendance::{AttendanceRecord, NewAttendance},
        audit::{EventType, Severity},
        user::User,
    },
    service::{
        audit,
        face_gate::{Capture, FaceGate},
    },
    store::{Store, StoreError},
};

/// Where a user stands for the current work day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DayState {
    NotCheckedIn,
    CheckedIn,
    CheckedOut,
}

impl DayState {
    pub fn of(record: Option<&AttendanceRecord>) -> Self {
        match record {
            None => DayState::NotCheckedIn,
            Some(r) if r.is_open() => DayState::CheckedIn,
            Some(_) => DayState::CheckedOut,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TodayStatus {
    pub state: DayState,
    pub checked_in: bool,
    pub checked_out: bool,
    pub attendance_id: Option<u64>,
    #[schema(value_type = Option<String>)]
    pub check_in_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub check_out_time: Option<DateTime<Utc>>,
    pub work_duration: Option<f64>,
    pub face_image: Option<String>,
    pub message: &'static str,
}

impl TodayStatus {
    pub fn from_record(record: Option<AttendanceRecord>) -> Self {
        let state = DayState::of(record.as_ref());
        let message = match state {
            DayState::NotCheckedIn => "Not checked in today",
            DayState::CheckedIn => "Checked in",
            DayState::CheckedOut => "Checked out for today",
        };

        match record {
            None => TodayStatus {
                state,
                checked_in: false,
                checked_out: false,
                attendance_id: None,
                check_in_time: None,
                check_out_time: None,
                work_duration: None,
                face_image: None,
                message,
            },
            Some(r) => TodayStatus {
                state,
                checked_in: true,
                checked_out: !r.is_open(),
                attendance_id: Some(r.id),
                check_in_time: Some(r.check_in_time),
                check_out_time: r.check_out_time,
                work_duration: r.work_duration,
                face_image: r.face_image,
                message,
            },
        }
    }
}

/// Hours between two instants, two decimals. Clock skew never yields a negative value.
pub fn work_hours(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> f64 {
    let seconds = (check_out - check_in).num_seconds().max(0) as f64;
    (seconds / 3600.0 * 100.0).round() / 100.0
}

fn normalize_location(location: Option<String>) -> Result<Option<String>, ServiceError> {
    let location = location.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
    if location.as_ref().is_some_and(|l| l.chars().count() > 100) {
        return Err(ServiceError::Validation(
            "Location must be at most 100 characters".into(),
        ));
    }
    Ok(location)
}

/// `NotCheckedIn -> CheckedIn`, gated by face verification.
pub async fn check_in(
    gate: &FaceGate<'_>,
    user: &User,
    capture: Capture<'_>,
    location: Option<String>,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<AttendanceRecord, ServiceError> {
    let store = gate.store;
    let today = now.date_naive();
    let location = normalize_location(location)?;

    if store.attendance_on(user.id, today).await?.is_some() {
        return Err(ServiceError::AlreadyCheckedIn);
    }

    let matched = gate.verify(user, capture, client, now).await?;

    let record = store
        .insert_attendance(NewAttendance {
            user_id: user.id,
            work_date: today,
            check_in_time: now,
            location: location.clone(),
            face_verified: true,
            face_image: Some(matched.image.data_url),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        })
        .await
        .map_err(|e| match e {
            // a concurrent check-in won the (user, work_date) unique key
            StoreError::Duplicate(_) => ServiceError::AlreadyCheckedIn,
            other => other.into(),
        })?;

    info!(user_id = user.id, attendance_id = record.id, score = matched.score, "Checked in");
    audit::record_event(
        store,
        Some(user.id),
        EventType::CheckIn,
        Severity::Info,
        match &location {
            Some(l) => format!("Checked in at {}", l),
            None => "Checked in".to_string(),
        },
        client,
        now,
    )
    .await;

    Ok(record.without_image())
}

/// `CheckedIn -> CheckedOut`. Without an id, targets today's record.
pub async fn check_out(
    store: &dyn Store,
    user: &User,
    attendance_id: Option<u64>,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<AttendanceRecord, ServiceError> {
    let record = match attendance_id {
        Some(id) => store
            .find_attendance(id)
            .await?
            .filter(|r| r.user_id == user.id),
        None => store.attendance_on(user.id, now.date_naive()).await?,
    }
    .ok_or(ServiceError::NoOpenCheckIn)?;

    if !record.is_open() {
        return Err(ServiceError::AlreadyCheckedOut);
    }

    let duration = work_hours(record.check_in_time, now);
    // conditional on the record still being open, so it closes exactly once
    if !store.close_attendance(record.id, now, duration).await? {
        return Err(ServiceError::AlreadyCheckedOut);
    }

    info!(user_id = user.id, attendance_id = record.id, duration, "Checked out");
    audit::record_event(
        store,
        Some(user.id),
        EventType::CheckOut,
        Severity::Info,
        format!("Checked out after {:.2} hours", duration),
        client,
        now,
    )
    .await;

    store
        .find_attendance(record.id)
        .await?
        .map(AttendanceRecord::without_image)
        .ok_or(ServiceError::NotFound("Attendance record"))
}

pub async fn today_status(
    store: &dyn Store,
    user: &User,
    now: DateTime<Utc>,
) -> Result<TodayStatus, ServiceError> {
    let record = store.attendance_on(user.id, now.date_naive()).await?;
    Ok(TodayStatus::from_record(record))
}
