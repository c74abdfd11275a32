use crate::{
    api::{admin, attendance},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;
use tracing::warn;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            (60_000 / requests_per_min as u64).max(1)
        };
        let cfg = GovernorConfigBuilder::default()
            .milliseconds_per_request(per_ms)
            .burst_size(requests_per_min.max(1))
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap_or_else(|| {
                warn!(requests_per_min, "Invalid rate limit; using governor defaults");
                GovernorConfig::default()
            });
        Governor::new(&cfg)
    }

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    cfg.service(
        web::scope(&config.api_prefix)
            // Public routes
            .service(
                web::resource("/auth/login")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/auth/register")
                    .wrap(register_limiter)
                    .route(web::post().to(handlers::register)),
            )
            // Protected routes
            .service(
                web::scope("")
                    .wrap(from_fn(auth_middleware)) // authentication
                    .wrap(protected_limiter) // rate limiting
                    .service(
                        web::scope("/auth")
                            .route("/logout", web::post().to(handlers::logout))
                            .service(
                                web::resource("/profile")
                                    .route(web::get().to(handlers::get_profile))
                                    .route(web::put().to(handlers::update_profile)),
                            )
                            .route("/setup-totp", web::post().to(handlers::setup_totp))
                            .route("/verify-totp", web::post().to(handlers::verify_totp))
                            .route("/register-face", web::post().to(handlers::register_face))
                            .route("/verify-face", web::post().to(handlers::verify_face)),
                    )
                    .service(
                        web::scope("/attendance")
                            .route("/checkin", web::post().to(attendance::check_in))
                            .route("/checkout", web::post().to(attendance::check_out))
                            .route("/today-status", web::get().to(attendance::today_status))
                            .route("/records", web::get().to(attendance::records))
                            .route("/summary", web::get().to(attendance::summary))
                            .route("/monthly-summary", web::get().to(attendance::monthly_summary))
                            .route("/dashboard", web::get().to(attendance::dashboard)),
                    )
                    .service(
                        web::scope("/admin")
                            .route("/dashboard", web::get().to(admin::dashboard))
                            .route("/users", web::get().to(admin::list_users))
                            // /admin/users/{id}
                            .route("/users/{id}", web::get().to(admin::get_user))
                            .route("/users/{id}/activate", web::put().to(admin::activate_user))
                            .route("/users/{id}/unlock", web::put().to(admin::unlock_user))
                            .route("/attendance", web::get().to(admin::list_attendance))
                            .route("/security-events", web::get().to(admin::security_events)),
                    ),
            ),
    );
}

// LOGIN
//  └─ access_token (ACCESS_TOKEN_TTL seconds)

// API REQUEST
//  └─ Authorization: Bearer access_token
//       └─ rejected once revoked by POST /auth/logout

// CHECK-IN
//  └─ face capture matched against the enrolled reference

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::revocation::RevokedTokens,
        face::{FaceMatcher, FacePolicy, image::png_data_url, matcher},
        store::{MemoryStore, Store},
    };
    use actix_web::{
        App,
        http::{StatusCode, header},
        test,
        web::Data,
    };
    use serde_json::{Value, json};

    const PEER: &str = "10.1.2.3:40000";

    macro_rules! test_app {
        ($config:expr) => {{
            let config: Config = $config;
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            let face: Arc<dyn FaceMatcher> = matcher::from_config(FacePolicy::Bytes, 0.95);
            let revoked = RevokedTokens::new(config.access_token_ttl);
            test::init_service(
                App::new()
                    .app_data(Data::from(store))
                    .app_data(Data::from(face))
                    .app_data(Data::new(revoked))
                    .app_data(Data::new(config.clone()))
                    .configure(|cfg| configure(cfg, config.clone())),
            )
            .await
        }};
    }

    macro_rules! register_and_login {
        ($app:expr, $username:expr) => {{
            let username: &str = $username;
            let resp = test::call_service(
                $app,
                post(
                    "/api/auth/register",
                    None,
                    json!({
                        "username": username,
                        "email": format!("{username}@example.com"),
                        "password": "s3cure-pass",
                        "full_name": "Route Tester",
                    }),
                )
                .to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::CREATED);

            let body: Value = test::call_and_read_body_json(
                $app,
                post(
                    "/api/auth/login",
                    None,
                    json!({ "username": username, "password": "s3cure-pass" }),
                )
                .to_request(),
            )
            .await;
            body["access_token"].as_str().unwrap().to_string()
        }};
    }

    fn with_token(req: test::TestRequest, token: Option<&str>) -> test::TestRequest {
        let req = req.peer_addr(PEER.parse().unwrap());
        match token {
            Some(t) => req.insert_header((header::AUTHORIZATION, format!("Bearer {t}"))),
            None => req,
        }
    }

    fn post(uri: &str, token: Option<&str>, body: Value) -> test::TestRequest {
        with_token(test::TestRequest::post().uri(uri).set_json(body), token)
    }

    fn get(uri: &str, token: Option<&str>) -> test::TestRequest {
        with_token(test::TestRequest::get().uri(uri), token)
    }

    #[actix_web::test]
    async fn protected_routes_need_a_bearer_token() {
        let app = test_app!(Config::for_tests());

        let resp = test::call_service(&app, get("/api/auth/profile", None).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = test::call_service(&app, get("/api/attendance/today-status", Some("garbage")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "AuthError");
    }

    #[actix_web::test]
    async fn login_rejects_a_wrong_password() {
        let app = test_app!(Config::for_tests());
        register_and_login!(&app, "route_bob");

        let resp = test::call_service(
            &app,
            post(
                "/api/auth/login",
                None,
                json!({ "username": "route_bob", "password": "nope-nope" }),
            )
            .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn face_enrolment_check_in_and_check_out() {
        let app = test_app!(Config::for_tests());
        let token = register_and_login!(&app, "route_alice");

        let profile: Value =
            test::call_and_read_body_json(&app, get("/api/auth/profile", Some(&token)).to_request()).await;
        assert_eq!(profile["username"], "route_alice");
        assert_eq!(profile["face_registered"], false);

        let face = json!({ "face_image": png_data_url(7), "face_detected": true });

        // no reference yet
        let resp = test::call_service(&app, post("/api/attendance/checkin", Some(&token), face.clone()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(&app, post("/api/auth/register-face", Some(&token), face.clone()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(&app, post("/api/attendance/checkin", Some(&token), face.clone()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let status: Value =
            test::call_and_read_body_json(&app, get("/api/attendance/today-status", Some(&token)).to_request()).await;
        assert_eq!(status["state"], "checked_in");

        let resp = test::call_service(&app, post("/api/attendance/checkin", Some(&token), face).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = test::call_service(&app, post("/api/attendance/checkout", Some(&token), json!({})).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(&app, post("/api/attendance/checkout", Some(&token), json!({})).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn admin_routes_are_forbidden_to_members() {
        let app = test_app!(Config::for_tests());
        let token = register_and_login!(&app, "route_carol");

        let resp = test::call_service(&app, get("/api/admin/dashboard", Some(&token)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn admins_see_every_user() {
        let mut config = Config::for_tests();
        config.admin_usernames = vec!["route_root".into()];
        let app = test_app!(config);

        let admin_token = register_and_login!(&app, "route_root");
        register_and_login!(&app, "route_dave");

        let users: Value =
            test::call_and_read_body_json(&app, get("/api/admin/users", Some(&admin_token)).to_request()).await;
        assert_eq!(users.as_array().map(Vec::len), Some(2));
    }

    #[actix_web::test]
    async fn logout_revokes_the_token() {
        let app = test_app!(Config::for_tests());
        let token = register_and_login!(&app, "route_erin");

        let resp = test::call_service(&app, post("/api/auth/logout", Some(&token), json!({})).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(&app, get("/api/auth/profile", Some(&token)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
