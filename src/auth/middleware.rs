use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::auth::revocation::RevokedTokens;
use crate::config::Config;
use crate::error::ServiceError;
use crate::model::role::Role;
use crate::store::Store;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header,
    web::Data,
};
use tracing::{debug, warn};

fn reject(req: ServiceRequest, err: ServiceError) -> ServiceResponse<BoxBody> {
    debug!(path = %req.path(), reason = %err, "Request rejected by auth middleware");
    req.into_response(err.error_response())
}

/// Resolves `Authorization: Bearer <token>` into an [`AuthUser`] request extension.
///
/// The token must verify, must not be revoked, and must belong to an existing active
/// user. The user row is loaded per request so deactivation takes effect immediately.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;
    let store = req
        .app_data::<Data<dyn Store>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Store missing"))?;
    let revoked = req
        .app_data::<Data<RevokedTokens>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Token registry missing"))?;

    let header_value = match req.headers().get(header::AUTHORIZATION) {
        Some(h) => match h.to_str() {
            Ok(v) => v.to_string(),
            Err(_) => {
                return Ok(reject(
                    req,
                    ServiceError::Unauthorized("Invalid Authorization header encoding"),
                ));
            }
        },
        None => {
            return Ok(reject(
                req,
                ServiceError::Unauthorized("Missing Authorization header"),
            ));
        }
    };

    let token = match header_value.strip_prefix("Bearer ") {
        Some(t) => t.trim(),
        None => {
            return Ok(reject(
                req,
                ServiceError::Unauthorized("Authorization header must start with Bearer"),
            ));
        }
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "Token verification failed");
            return Ok(reject(
                req,
                ServiceError::Unauthorized("Invalid or expired token"),
            ));
        }
    };

    if revoked.is_revoked(&claims.jti).await {
        return Ok(reject(req, ServiceError::Unauthorized("Token has been revoked")));
    }

    let user = match store.find_user(claims.user_id).await {
        Ok(Some(u)) => u,
        Ok(None) => return Ok(reject(req, ServiceError::Unauthorized("User not found"))),
        Err(e) => {
            warn!(error = %e, user_id = claims.user_id, "Failed to load token owner");
            return Ok(reject(req, ServiceError::from(e)));
        }
    };

    if !user.is_active {
        return Ok(reject(req, ServiceError::AccountInactive));
    }

    // role comes from the row, not the token, so promotions and demotions apply at once
    let role = Role::for_user(user.is_admin);
    if Role::from_id(claims.role) != Some(role) {
        debug!(user_id = user.id, "Token role is stale; using stored role");
    }

    let auth_user = AuthUser {
        user_id: user.id,
        username: user.username.clone(),
        role,
        jti: claims.jti,
        user,
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
