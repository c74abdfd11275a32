use std::net::SocketAddr;

use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, http::header};
use futures::future::{Ready, ready};

use crate::{error::ServiceError, model::role::Role, model::user::User};

/// The caller, as resolved by the auth middleware from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
    /// Token id, needed to revoke on logout
    pub jti: String,
    /// Row loaded when the request was authenticated
    pub user: User,
}

impl FromRequest for AuthUser {
    type Error = ServiceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or(ServiceError::Unauthorized("Authentication required")),
        )
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("Admin only"))
        }
    }
}

/// Where a request came from, for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_http(req: &HttpRequest) -> Self {
        let ip_address = req.connection_info().realip_remote_addr().map(|addr| {
            addr.parse::<SocketAddr>()
                .map(|sock| sock.ip().to_string())
                .unwrap_or_else(|_| addr.to_string())
        });

        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        Self { ip_address, user_agent }
    }
}

impl FromRequest for ClientInfo {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(ClientInfo::from_http(req)))
    }
}
