use crate::{
    auth::{
        auth::{AuthUser, ClientInfo},
        revocation::RevokedTokens,
    },
    config::Config,
    error::ServiceError,
    face::FaceMatcher,
    model::{
        audit::{EventType, Severity},
        user::{ProfileUpdate, UserProfile},
    },
    models::{
        FaceReq, LoginReqDto, LoginResponse, MessageResponse, RegisterResponse, TotpCodeReq,
    },
    service::{
        audit,
        auth_gateway::{self, Registration},
        face_gate::{Capture, FaceGate},
        totp_gate,
    },
    store::Store,
};
use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument};

/// User registration handler
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = Registration,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Invalid input or password too short"),
        (status = 409, description = "Username or email already registered")
    ),
    tag = "Auth"
)]
pub async fn register(
    req: web::Json<Registration>,
    client: ClientInfo,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ServiceError> {
    let user = auth_gateway::register(
        store.get_ref(),
        &config,
        req.into_inner(),
        &client,
        Utc::now(),
    )
    .await?;

    Ok(HttpResponse::Created().json(RegisterResponse {
        message: "User registered successfully",
        user_id: user.id,
        username: user.username,
    }))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Access token issued", body = LoginResponse),
        (status = 401, description = "Invalid username or password"),
        (status = 403, description = "Account inactive"),
        (status = 423, description = "Account locked after too many failed attempts")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(store, config, user, client),
    fields(username = %user.username, ip = ?client.ip_address)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    client: ClientInfo,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ServiceError> {
    info!("Login request received");

    let outcome = auth_gateway::login(
        store.get_ref(),
        &config,
        &user.username,
        &user.password,
        &client,
        Utc::now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: outcome.token,
        token_type: "bearer",
        expires_in: config.access_token_ttl,
        user_id: outcome.user.id,
        username: outcome.user.username.clone(),
        requires_face_verification: outcome.user.face_registered,
        requires_totp: outcome.user.totp_enabled,
        user: UserProfile::from(&outcome.user),
    }))
}

/// Revokes the presented token and records the logout.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    auth: AuthUser,
    client: ClientInfo,
    store: web::Data<dyn Store>,
    revoked: web::Data<RevokedTokens>,
) -> Result<HttpResponse, ServiceError> {
    revoked.revoke(&auth.jti).await;

    audit::record_event(
        store.get_ref(),
        Some(auth.user_id),
        EventType::Logout,
        Severity::Info,
        "User logged out successfully",
        &client,
        Utc::now(),
    )
    .await;

    info!(user_id = auth.user_id, username = %auth.username, "Logged out");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Logged out successfully")))
}

#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn get_profile(auth: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(UserProfile::from(&auth.user))
}

#[utoipa::path(
    put,
    path = "/api/auth/profile",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Profile updated", body = UserProfile),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn update_profile(
    auth: AuthUser,
    req: web::Json<ProfileUpdate>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    let user = auth_gateway::update_profile(store.get_ref(), &auth.user, req.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserProfile::from(&user)))
}

#[utoipa::path(
    post,
    path = "/api/auth/setup-totp",
    responses(
        (status = 200, description = "Secret issued; factor enabled after first valid code", body = totp_gate::TotpSetup),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn setup_totp(
    auth: AuthUser,
    client: ClientInfo,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ServiceError> {
    let setup = totp_gate::setup(
        store.get_ref(),
        &config.totp_issuer,
        &auth.user,
        &client,
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(setup))
}

/// Verifies a code. While setup is pending, the first valid code enables TOTP.
#[utoipa::path(
    post,
    path = "/api/auth/verify-totp",
    request_body = TotpCodeReq,
    responses(
        (status = 200, description = "Code accepted", body = MessageResponse),
        (status = 400, description = "TOTP not set up"),
        (status = 401, description = "Invalid code")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn verify_totp(
    auth: AuthUser,
    req: web::Json<TotpCodeReq>,
    client: ClientInfo,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, ServiceError> {
    let now = Utc::now();
    if auth.user.totp_enabled {
        totp_gate::verify(store.get_ref(), &auth.user, &req.totp_code, &client, now).await?;
    } else {
        totp_gate::verify_setup(store.get_ref(), &auth.user, &req.totp_code, &client, now).await?;
    }

    Ok(HttpResponse::Ok().json(MessageResponse::new("TOTP verification successful")))
}

#[utoipa::path(
    post,
    path = "/api/auth/register-face",
    request_body = FaceReq,
    responses(
        (status = 200, description = "Face enrolled", body = MessageResponse),
        (status = 422, description = "Image missing, malformed or without a face")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn register_face(
    auth: AuthUser,
    req: web::Json<FaceReq>,
    client: ClientInfo,
    store: web::Data<dyn Store>,
    matcher: web::Data<dyn FaceMatcher>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ServiceError> {
    let gate = FaceGate {
        store: store.get_ref(),
        matcher: matcher.get_ref(),
        max_image_bytes: config.max_image_bytes,
    };
    let capture = Capture {
        data_url: &req.face_image,
        face_detected: req.face_detected,
    };

    gate.register(&auth.user, capture, &client, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Face registered successfully")))
}

#[utoipa::path(
    post,
    path = "/api/auth/verify-face",
    request_body = FaceReq,
    responses(
        (status = 200, description = "Face matched", body = Object, example = json!({
            "message": "Face verification successful",
            "similarity": 1.0
        })),
        (status = 400, description = "Face not registered"),
        (status = 401, description = "Face did not match"),
        (status = 422, description = "Image missing, malformed or without a face")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn verify_face(
    auth: AuthUser,
    req: web::Json<FaceReq>,
    client: ClientInfo,
    store: web::Data<dyn Store>,
    matcher: web::Data<dyn FaceMatcher>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ServiceError> {
    let gate = FaceGate {
        store: store.get_ref(),
        matcher: matcher.get_ref(),
        max_image_bytes: config.max_image_bytes,
    };
    let capture = Capture {
        data_url: &req.face_image,
        face_detected: req.face_detected,
    };

    let matched = gate.verify(&auth.user, capture, &client, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Face verification successful",
        "similarity": matched.score,
    })))
}
