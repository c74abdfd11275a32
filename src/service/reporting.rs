//! Read-only aggregation over attendance rows. Nothing here writes.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::ServiceError,
    model::{
        attendance::{AttendanceFilter, AttendanceRecord, AttendanceTotals},
        user::{User, UserProfile},
    },
    service::attendance::{TodayStatus, today_status},
    store::Store,
};

/// One row per user per work date, so a month never holds more.
const MONTH_ROW_LIMIT: u32 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct DateRange {
    #[schema(value_type = String, example = "2026-03-01")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, example = "2026-03-31")]
    pub end_date: NaiveDate,
}

impl DateRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, ServiceError> {
        if start_date > end_date {
            return Err(ServiceError::Validation(
                "start_date must not be after end_date".into(),
            ));
        }
        Ok(Self { start_date, end_date })
    }

    /// The period of `kind` that contains `day`; weeks start on Monday.
    pub fn containing(kind: Period, day: NaiveDate) -> Self {
        match kind {
            Period::Day => Self { start_date: day, end_date: day },
            Period::Week => {
                let start = day.week(Weekday::Mon).first_day();
                Self { start_date: start, end_date: start + Days::new(6) }
            }
            Period::Month => {
                let start = day.with_day(1).unwrap_or(day);
                let end = start
                    .checked_add_months(chrono::Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .unwrap_or(day);
                Self { start_date: start, end_date: end }
            }
        }
    }

    pub fn month(year: i32, month: u32) -> Result<Self, ServiceError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first| Self::containing(Period::Month, first))
            .ok_or_else(|| ServiceError::Validation("month must be between 1 and 12".into()))
    }

    /// Inclusive instant bounds covering every second of both end days.
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = self.start_date.and_time(NaiveTime::MIN).and_utc();
        let to = self
            .end_date
            .and_hms_micro_opt(23, 59, 59, 999_999)
            .map(|dt| dt.and_utc())
            .unwrap_or(from);
        (from, to)
    }

    /// Monday to Friday days in the range.
    pub fn weekdays(&self) -> u32 {
        self.start_date
            .iter_days()
            .take_while(|d| *d <= self.end_date)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .count() as u32
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttendanceSummary {
    /// Records checked in during the period
    pub total_days: u32,
    /// Distinct days with a completed check-out
    pub completed_days: u32,
    /// Weekdays in the period
    pub working_days: u32,
    pub verified_count: u32,
    pub unverified_count: u32,
    pub total_hours: f64,
    pub average_hours_per_day: f64,
    /// completed_days / working_days, as a percentage
    pub attendance_rate: f64,
    pub period: DateRange,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Turns store totals for `period` into the reported figures.
pub fn summarize(totals: AttendanceTotals, period: DateRange) -> AttendanceSummary {
    let AttendanceTotals { total_days, completed_days, verified_count, total_hours } = totals;
    let working_days = period.weekdays();

    AttendanceSummary {
        total_days,
        completed_days,
        working_days,
        verified_count,
        unverified_count: total_days.saturating_sub(verified_count),
        total_hours: round2(total_hours),
        average_hours_per_day: if completed_days > 0 {
            round2(total_hours / completed_days as f64)
        } else {
            0.0
        },
        attendance_rate: if working_days > 0 {
            round2(completed_days as f64 / working_days as f64 * 100.0)
        } else {
            0.0
        },
        period,
    }
}

/// The user's records in `period`, newest first.
pub async fn records_in(
    store: &dyn Store,
    user_id: u64,
    period: DateRange,
    limit: u32,
) -> Result<Vec<AttendanceRecord>, ServiceError> {
    let (from, to) = period.bounds();
    Ok(store
        .list_attendance(&AttendanceFilter {
            user_id: Some(user_id),
            from: Some(from),
            to: Some(to),
            offset: 0,
            limit,
        })
        .await?)
}

pub async fn summary(
    store: &dyn Store,
    user_id: u64,
    period: DateRange,
) -> Result<AttendanceSummary, ServiceError> {
    let totals = store
        .attendance_totals(user_id, period.start_date, period.end_date)
        .await?;
    Ok(summarize(totals, period))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub summary: AttendanceSummary,
    pub daily_records: Vec<AttendanceRecord>,
}

pub async fn monthly(
    store: &dyn Store,
    user_id: u64,
    year: i32,
    month: u32,
) -> Result<MonthlySummary, ServiceError> {
    let period = DateRange::month(year, month)?;
    let summary = summary(store, user_id, period).await?;
    let records = records_in(store, user_id, period, MONTH_ROW_LIMIT).await?;

    Ok(MonthlySummary {
        year,
        month,
        summary,
        daily_records: records
            .into_iter()
            .map(AttendanceRecord::without_image)
            .collect(),
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Dashboard {
    pub user_info: UserProfile,
    pub today_status: TodayStatus,
    pub week_summary: AttendanceSummary,
    pub month_summary: AttendanceSummary,
    pub recent_records: Vec<AttendanceRecord>,
}

pub async fn dashboard(
    store: &dyn Store,
    user: &User,
    now: DateTime<Utc>,
) -> Result<Dashboard, ServiceError> {
    let today = now.date_naive();
    let week = DateRange::containing(Period::Week, today);
    let month = DateRange::containing(Period::Month, today);

    let recent_records = store
        .list_attendance(&AttendanceFilter {
            user_id: Some(user.id),
            limit: 10,
            ..Default::default()
        })
        .await?
        .into_iter()
        .map(AttendanceRecord::without_image)
        .collect();

    Ok(Dashboard {
        user_info: UserProfile::from(user),
        today_status: today_status(store, user, now).await?,
        week_summary: summary(store, user.id, week).await?,
        month_summary: summary(store, user.id, month).await?,
        recent_records,
    })
}
