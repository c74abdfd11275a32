use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 7)]
    pub user_id: u64,

    /// Day the check-in belongs to; one record per user per day
    #[schema(value_type = String, example = "2026-01-05")]
    pub work_date: NaiveDate,

    #[schema(value_type = String, example = "2026-01-05T09:00:00Z")]
    pub check_in_time: DateTime<Utc>,

    #[schema(value_type = Option<String>, example = "2026-01-05T17:30:00Z")]
    pub check_out_time: Option<DateTime<Utc>>,

    /// Hours between check-in and check-out, two decimals
    #[schema(example = 8.5)]
    pub work_duration: Option<f64>,

    #[schema(example = "HQ, floor 3")]
    pub location: Option<String>,
    pub face_verified: bool,

    /// Captured data URL; large, so list endpoints may strip it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_image: Option<String>,

    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn is_open(&self) -> bool {
        self.check_out_time.is_none()
    }

    pub fn without_image(mut self) -> Self {
        self.face_image = None;
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub user_id: u64,
    pub work_date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub location: Option<String>,
    pub face_verified: bool,
    pub face_image: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Row selection for attendance listings, newest check-in first.
#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub user_id: Option<u64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub offset: u32,
    pub limit: u32,
}

/// Per-user aggregates over a work-date range, computed by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttendanceTotals {
    pub total_days: u32,
    /// Distinct work dates with a check-out
    pub completed_days: u32,
    pub verified_count: u32,
    pub total_hours: f64,
}

impl AttendanceTotals {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Self {
        let mut totals = Self::default();
        let mut completed = std::collections::BTreeSet::new();
        for r in records {
            totals.total_days += 1;
            if r.face_verified {
                totals.verified_count += 1;
            }
            if r.check_out_time.is_some() {
                completed.insert(r.work_date);
            }
            totals.total_hours += r.work_duration.unwrap_or(0.0);
        }
        totals.completed_days = completed.len() as u32;
        totals
    }
}
