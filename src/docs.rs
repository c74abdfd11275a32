use crate::model::attendance::AttendanceRecord;
use crate::model::audit::{LoginAttempt, SecurityEvent};
use crate::model::user::{ProfileUpdate, UserProfile, UserStats, UserSummary};
use crate::models::{
    CheckInReq, CheckOutReq, FaceReq, LoginReqDto, LoginResponse, MessageResponse,
    RegisterResponse, TotpCodeReq,
};
use crate::service::admin::{
    AdminDashboard, AttendanceRow, AttendanceStats, SecurityEventRow, UserDetail, UserRef,
};
use crate::service::attendance::{DayState, TodayStatus};
use crate::service::auth_gateway::Registration;
use crate::service::reporting::{AttendanceSummary, Dashboard, DateRange, MonthlySummary, Period};
use crate::service::totp_gate::TotpSetup;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MFA Attendance API",
        version = "1.0.0",
        description = r#"
## Multi-factor Attendance System

Employees sign in with a password, then prove presence at check-in with a face capture.
A TOTP authenticator can be enrolled as an additional factor.

### 🔹 Key Features
- **Authentication**
  - Registration, login with lockout after repeated failures, logout
- **Second factors**
  - Face enrolment and verification, TOTP setup and verification
- **Attendance**
  - One check-in and check-out per day, status, records and summaries
- **Administration**
  - User management, attendance across users, security events

### 🔐 Security
Everything except registration and login needs a **JWT Bearer** token.
Endpoints under `/api/admin` are restricted to admins.

### 📦 Response Format
- JSON bodies; errors carry `error`, `code` and `message`
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::logout,
        crate::auth::handlers::get_profile,
        crate::auth::handlers::update_profile,
        crate::auth::handlers::setup_totp,
        crate::auth::handlers::verify_totp,
        crate::auth::handlers::register_face,
        crate::auth::handlers::verify_face,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today_status,
        crate::api::attendance::records,
        crate::api::attendance::summary,
        crate::api::attendance::monthly_summary,
        crate::api::attendance::dashboard,

        crate::api::admin::dashboard,
        crate::api::admin::list_users,
        crate::api::admin::get_user,
        crate::api::admin::activate_user,
        crate::api::admin::unlock_user,
        crate::api::admin::list_attendance,
        crate::api::admin::security_events
    ),
    components(
        schemas(
            Registration,
            RegisterResponse,
            LoginReqDto,
            LoginResponse,
            MessageResponse,
            UserProfile,
            ProfileUpdate,
            TotpSetup,
            TotpCodeReq,
            FaceReq,
            CheckInReq,
            CheckOutReq,
            AttendanceRecord,
            DayState,
            TodayStatus,
            Period,
            DateRange,
            AttendanceSummary,
            MonthlySummary,
            Dashboard,
            UserStats,
            UserSummary,
            UserDetail,
            UserRef,
            AttendanceStats,
            AdminDashboard,
            AttendanceRow,
            LoginAttempt,
            SecurityEvent,
            SecurityEventRow
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and second factors"),
        (name = "Attendance", description = "Check-in, check-out and reporting"),
        (name = "Admin", description = "Administration APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route_group_with_bearer_auth() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/api/auth/login"));
        assert!(paths.contains_key("/api/attendance/checkin"));
        assert!(paths.contains_key("/api/admin/users/{id}/unlock"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
