//! Request and response bodies of the HTTP API that are not domain rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{model::user::UserProfile, service::reporting::Period};

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "s3cure-pass")]
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: &'static str,
    /// Seconds until the token expires
    #[schema(example = 1800)]
    pub expires_in: usize,
    pub user_id: u64,
    pub username: String,
    pub requires_face_verification: bool,
    pub requires_totp: bool,
    pub user: UserProfile,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterResponse {
    #[schema(example = "User registered successfully")]
    pub message: &'static str,
    pub user_id: u64,
    pub username: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// A browser capture: base64 data URL plus the client's own face detection result.
#[derive(Deserialize, ToSchema)]
pub struct FaceReq {
    #[schema(example = "data:image/jpeg;base64,/9j/4AAQ...")]
    pub face_image: String,
    pub face_detected: Option<bool>,
}

#[derive(Deserialize, ToSchema)]
pub struct TotpCodeReq {
    #[schema(example = "123456")]
    pub totp_code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckInReq {
    #[schema(example = "data:image/jpeg;base64,/9j/4AAQ...")]
    pub face_image: String,
    #[schema(example = "HQ, floor 3")]
    pub location: Option<String>,
    pub face_detected: Option<bool>,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct CheckOutReq {
    pub attendance_id: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
pub struct RecordsQuery {
    /// YYYY-MM-DD
    #[param(value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    /// YYYY-MM-DD, inclusive
    #[param(value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    pub limit: Option<u32>,
}

/// Either an explicit `start_date`/`end_date` pair or a named `period` around today.
#[derive(Deserialize, IntoParams)]
pub struct SummaryQuery {
    #[param(value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[param(inline)]
    pub period: Option<Period>,
}

#[derive(Deserialize, IntoParams)]
pub struct MonthQuery {
    #[param(example = 2026)]
    pub year: i32,
    #[param(example = 3)]
    pub month: u32,
}

#[derive(Deserialize, IntoParams)]
pub struct PageQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct AdminAttendanceQuery {
    #[param(value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    pub user_id: Option<u64>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct EventQuery {
    /// e.g. `check_in`, `face_failure`, `account_locked`
    pub event_type: Option<String>,
    /// `info`, `warning`, `error` or `critical`
    pub severity: Option<String>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

/// Page size used when the client sends none; also the ceiling.
pub const DEFAULT_PAGE: u32 = 100;

pub fn page_limit(limit: Option<u32>, default: u32) -> u32 {
    limit.unwrap_or(default).clamp(1, DEFAULT_PAGE)
}
