use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde_json::json;
use strum_macros::IntoStaticStr;

use crate::store::StoreError;

/// Every failure a request can end with. The variant name is sent to the client
/// as `code`; [`ServiceError::category`] groups variants into the public taxonomy.
#[derive(Debug, Display, IntoStaticStr)]
pub enum ServiceError {
    #[display(fmt = "{}", _0)]
    Validation(String),

    #[display(fmt = "Password must be at least {} characters", _0)]
    WeakSecret(usize),

    #[display(fmt = "This {} is already registered", _0)]
    DuplicateIdentity(&'static str),

    #[display(fmt = "Invalid username or password")]
    InvalidCredential,

    #[display(fmt = "Account is locked due to too many failed attempts")]
    AccountLocked(DateTime<Utc>),

    #[display(fmt = "Account is inactive")]
    AccountInactive,

    #[display(fmt = "{}", _0)]
    Unauthorized(&'static str),

    #[display(fmt = "{}", _0)]
    Forbidden(&'static str),

    #[display(fmt = "Face image is missing or is not a valid JPEG/PNG capture")]
    NoFaceOrInvalidImage,

    #[display(fmt = "No face detected in the capture")]
    NoFaceDetected,

    #[display(fmt = "Face recognition is not set up for this user")]
    FaceNotRegistered,

    #[display(fmt = "Face verification failed")]
    FaceMismatch,

    #[display(fmt = "TOTP is not set up for this user")]
    TotpNotConfigured,

    #[display(fmt = "Invalid TOTP code")]
    InvalidCode,

    #[display(fmt = "You have already checked in today")]
    AlreadyCheckedIn,

    #[display(fmt = "You have already checked out")]
    AlreadyCheckedOut,

    #[display(fmt = "No active check-in record found")]
    NoOpenCheckIn,

    #[display(fmt = "{} not found", _0)]
    NotFound(&'static str),

    #[display(fmt = "Internal Server Error")]
    Internal,
}

impl std::error::Error for ServiceError {}

impl ServiceError {
    pub fn category(&self) -> &'static str {
        use ServiceError::*;
        match self {
            Validation(_) | WeakSecret(_) => "ValidationError",
            InvalidCredential | AccountLocked(_) | AccountInactive | Unauthorized(_)
            | Forbidden(_) => "AuthError",
            NoFaceOrInvalidImage | NoFaceDetected | FaceNotRegistered | FaceMismatch
            | TotpNotConfigured | InvalidCode => "VerificationError",
            DuplicateIdentity(_) | AlreadyCheckedIn | AlreadyCheckedOut | NoOpenCheckIn => {
                "ConflictError"
            }
            NotFound(_) => "NotFoundError",
            Internal => "InternalError",
        }
    }

    pub fn code(&self) -> &'static str {
        self.into()
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        use ServiceError::*;
        match self {
            Validation(_) | WeakSecret(_) | FaceNotRegistered | TotpNotConfigured
            | NoOpenCheckIn => StatusCode::BAD_REQUEST,
            InvalidCredential | Unauthorized(_) | FaceMismatch | InvalidCode => {
                StatusCode::UNAUTHORIZED
            }
            AccountInactive | Forbidden(_) => StatusCode::FORBIDDEN,
            AccountLocked(_) => StatusCode::LOCKED,
            NoFaceOrInvalidImage | NoFaceDetected => StatusCode::UNPROCESSABLE_ENTITY,
            DuplicateIdentity(_) | AlreadyCheckedIn | AlreadyCheckedOut => StatusCode::CONFLICT,
            NotFound(_) => StatusCode::NOT_FOUND,
            Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "error": self.category(),
            "code": self.code(),
            "message": self.to_string(),
        });

        if let ServiceError::AccountLocked(until) = self {
            body["locked_until"] = json!(until);
        }

        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(field) => ServiceError::DuplicateIdentity(field),
            StoreError::Database(msg) => {
                tracing::error!(error = %msg, "Store operation failed");
                ServiceError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_variant_names() {
        assert_eq!(ServiceError::NoOpenCheckIn.code(), "NoOpenCheckIn");
        assert_eq!(ServiceError::DuplicateIdentity("username").code(), "DuplicateIdentity");
        assert_eq!(ServiceError::AccountLocked(Utc::now()).code(), "AccountLocked");
    }

    #[test]
    fn taxonomy_and_status() {
        let conflict = ServiceError::AlreadyCheckedIn;
        assert_eq!(conflict.category(), "ConflictError");
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let locked = ServiceError::AccountLocked(Utc::now());
        assert_eq!(locked.category(), "AuthError");
        assert_eq!(locked.status_code(), StatusCode::LOCKED);

        assert_eq!(ServiceError::FaceMismatch.category(), "VerificationError");
        assert_eq!(ServiceError::NotFound("User").to_string(), "User not found");
    }

    #[test]
    fn database_errors_are_hidden() {
        let err: ServiceError = StoreError::Database("connection reset".into()).into();
        assert!(matches!(err, ServiceError::Internal));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
