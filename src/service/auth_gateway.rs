use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::{
    auth::{
        auth::ClientInfo,
        jwt::{Claims, generate_access_token},
        lockout::LockoutPolicy,
        password::{hash_password, verify_password},
    },
    config::Config,
    error::ServiceError,
    model::{
        audit::{EventType, Severity},
        role::Role,
        user::{NewUser, ProfileUpdate, User},
    },
    service::audit,
    store::{Store, StoreError},
    utils::identity_filter,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Registration {
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "jdoe@company.com")]
    pub email: String,
    #[schema(example = "s3cure-pass")]
    pub password: String,
    #[schema(example = "John Doe")]
    pub full_name: String,
    #[schema(example = "+8801712345678")]
    pub phone_number: Option<String>,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub token: String,
    pub claims: Claims,
    pub user: User,
}

fn validate_username(username: &str) -> Result<(), ServiceError> {
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return Err(ServiceError::Validation(
            "Username must be between 3 and 50 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ServiceError::Validation(
            "Username may contain only letters, digits, '_', '.' and '-'".into(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ServiceError> {
    let valid = email.len() <= 100
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        })
        && !email.contains(char::is_whitespace);

    if valid {
        Ok(())
    } else {
        Err(ServiceError::Validation("A valid email address is required".into()))
    }
}

fn validate_full_name(full_name: &str) -> Result<(), ServiceError> {
    if full_name.is_empty() || full_name.chars().count() > 100 {
        return Err(ServiceError::Validation(
            "Full name must be between 1 and 100 characters".into(),
        ));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<(), ServiceError> {
    if phone.chars().count() > 20 {
        return Err(ServiceError::Validation(
            "Phone number must be at most 20 characters".into(),
        ));
    }
    Ok(())
}

/// Creates an account. Identity clashes are reported before password strength so a
/// taken username is never masked by a weak password.
pub async fn register(
    store: &dyn Store,
    config: &Config,
    req: Registration,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<User, ServiceError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    let full_name = req.full_name.trim().to_string();
    let phone_number = req
        .phone_number
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    validate_username(&username)?;
    validate_email(&email)?;
    validate_full_name(&full_name)?;
    if let Some(phone) = &phone_number {
        validate_phone(phone)?;
    }

    // cuckoo filter miss means neither identity exists; a hit needs the store to confirm
    if identity_filter::might_exist(&username, &email) {
        if let Some(field) = store.identity_taken(&username, &email).await? {
            debug!(field, "Registration rejected: identity taken");
            return Err(ServiceError::DuplicateIdentity(field));
        }
    }

    if req.password.chars().count() < config.password_min_length {
        return Err(ServiceError::WeakSecret(config.password_min_length));
    }

    let password_hash = hash_password(&req.password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ServiceError::Internal
    })?;

    let user = store
        .create_user(NewUser {
            username,
            email,
            password_hash,
            full_name,
            phone_number,
            is_admin: config
                .admin_usernames
                .iter()
                .any(|a| a.eq_ignore_ascii_case(req.username.trim())),
        })
        .await?;

    identity_filter::insert(&user.username, &user.email);
    info!(user_id = user.id, username = %user.username, "User registered");

    audit::record_event(
        store,
        Some(user.id),
        EventType::UserRegistered,
        Severity::Info,
        "New user registered successfully",
        client,
        now,
    )
    .await;

    Ok(user)
}

/// Checks credentials against the lockout policy and issues an access token.
///
/// Order matters: an unknown user and a wrong password look the same to the caller,
/// an active lock is reported even for the right password, and the inactive check
/// only runs once the password is proven.
pub async fn login(
    store: &dyn Store,
    config: &Config,
    username: &str,
    password: &str,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<LoginOutcome, ServiceError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ServiceError::Validation(
            "Username and password are required".into(),
        ));
    }

    let policy = LockoutPolicy::from_config(config);

    let Some(user) = store.find_user_by_username(username).await? else {
        info!("Invalid credentials: user not found");
        audit::record_login_attempt(store, None, username, client, Some("User not found"), now)
            .await;
        return Err(ServiceError::InvalidCredential);
    };

    let state = user.login_state();
    if let Some(until) = policy.locked_until(&state, now) {
        info!(user_id = user.id, %until, "Login refused: account locked");
        audit::record_login_attempt(store, Some(user.id), username, client, Some("Account locked"), now)
            .await;
        return Err(ServiceError::AccountLocked(until));
    }

    if let Err(e) = verify_password(password, &user.password_hash) {
        info!(user_id = user.id, error = %e, "Invalid credentials: password mismatch");

        let Some(next) = store.record_login_failure(user.id, &policy, now).await? else {
            return Err(ServiceError::InvalidCredential);
        };
        audit::record_login_attempt(store, Some(user.id), username, client, Some("Invalid password"), now)
            .await;

        if let Some(until) = next.locked_until {
            warn!(user_id = user.id, attempts = next.failed_login_attempts, %until, "Account locked");
            audit::record_event(
                store,
                Some(user.id),
                EventType::AccountLocked,
                Severity::Warning,
                format!(
                    "Account locked after {} failed login attempts",
                    next.failed_login_attempts
                ),
                client,
                now,
            )
            .await;
        }
        return Err(ServiceError::InvalidCredential);
    }

    if !user.is_active {
        audit::record_login_attempt(store, Some(user.id), username, client, Some("Account inactive"), now)
            .await;
        return Err(ServiceError::AccountInactive);
    }

    if state != policy.record_success() {
        store.save_login_state(user.id, &policy.record_success()).await?;
    }

    let (token, claims) = generate_access_token(
        user.id,
        &user.username,
        Role::for_user(user.is_admin),
        &config.jwt_secret,
        config.access_token_ttl,
        now,
    )
    .map_err(|e| {
        error!(error = %e, "Failed to sign access token");
        ServiceError::Internal
    })?;

    audit::record_login_attempt(store, Some(user.id), username, client, None, now).await;
    audit::record_event(
        store,
        Some(user.id),
        EventType::Login,
        Severity::Info,
        "User logged in",
        client,
        now,
    )
    .await;

    info!(user_id = user.id, "Login successful");
    Ok(LoginOutcome { token, claims, user })
}

/// Edits the caller's own profile; returns the updated row.
pub async fn update_profile(
    store: &dyn Store,
    user: &User,
    mut update: ProfileUpdate,
) -> Result<User, ServiceError> {
    update.full_name = update.full_name.map(|s| s.trim().to_string());
    update.email = update.email.map(|s| s.trim().to_string());
    update.phone_number = update.phone_number.map(|s| s.trim().to_string());

    if update.is_empty() {
        return Err(ServiceError::Validation("Nothing to update".into()));
    }
    if let Some(full_name) = &update.full_name {
        validate_full_name(full_name)?;
    }
    if let Some(email) = &update.email {
        validate_email(email)?;
    }
    if let Some(phone) = &update.phone_number {
        validate_phone(phone)?;
    }

    if !store.update_profile(user.id, &update).await? {
        return Err(ServiceError::NotFound("User"));
    }

    if let Some(email) = &update.email {
        if !email.eq_ignore_ascii_case(&user.email) {
            identity_filter::replace_email(&user.email, email);
        }
    }

    store
        .find_user(user.id)
        .await?
        .ok_or(ServiceError::NotFound("User"))
}

/// Promotes the configured usernames; unknown names are reported and skipped.
pub async fn ensure_admins(store: &dyn Store, usernames: &[String]) -> Result<(), StoreError> {
    for username in usernames {
        if store.set_admin(username, true).await? {
            info!(username = %username, "Admin role granted");
        } else {
            warn!(username = %username, "Configured admin is not registered yet");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn registration(username: &str, email: &str, password: &str) -> Registration {
        Registration {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            full_name: "Test User".into(),
            phone_number: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[actix_web::test]
    async fn duplicate_username_creates_no_row() {
        let store = MemoryStore::new();
        let config = Config::for_tests();
        let client = ClientInfo::default();

        register(&store, &config, registration("gw_dup", "gw_dup@x.io", "password1"), &client, t0())
            .await
            .unwrap();

        let err = register(
            &store,
            &config,
            registration("GW_DUP", "other@x.io", "password1"),
            &client,
            t0(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateIdentity("username")));

        let err = register(
            &store,
            &config,
            registration("gw_other", "gw_dup@x.io", "password1"),
            &client,
            t0(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateIdentity("email")));

        assert_eq!(store.list_users(0, 100).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn short_password_is_weak() {
        let store = MemoryStore::new();
        let err = register(
            &store,
            &Config::for_tests(),
            registration("gw_weak", "gw_weak@x.io", "short"),
            &ClientInfo::default(),
            t0(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::WeakSecret(8)));
        assert!(store.find_user_by_username("gw_weak").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn malformed_identity_is_a_validation_error() {
        let store = MemoryStore::new();
        let config = Config::for_tests();
        let client = ClientInfo::default();

        for (username, email) in [("ab", "ok@x.io"), ("has space", "ok@x.io"), ("fine_name", "nope")] {
            let err = register(&store, &config, registration(username, email, "password1"), &client, t0())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "{username} / {email}");
        }
    }

    #[actix_web::test]
    async fn login_issues_token_and_logs_attempt() {
        let store = MemoryStore::new();
        let config = Config::for_tests();
        let client = ClientInfo::default();
        register(&store, &config, registration("gw_login", "gw_login@x.io", "password1"), &client, t0())
            .await
            .unwrap();

        let outcome = login(&store, &config, "gw_login", "password1", &client, t0())
            .await
            .unwrap();
        assert_eq!(outcome.claims.sub, "gw_login");
        assert_eq!(outcome.claims.role, Role::Member.id());

        let attempts = store.list_login_attempts(Some(outcome.user.id), 10).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].success);
    }

    #[actix_web::test]
    async fn sixth_attempt_is_locked_even_with_right_password() {
        let store = MemoryStore::new();
        let config = Config::for_tests();
        let client = ClientInfo::default();
        register(&store, &config, registration("gw_lock", "gw_lock@x.io", "password1"), &client, t0())
            .await
            .unwrap();

        for minute in 0..5 {
            let err = login(&store, &config, "gw_lock", "wrong-pass", &client, t0() + Duration::minutes(minute))
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidCredential));
        }

        let err = login(&store, &config, "gw_lock", "password1", &client, t0() + Duration::minutes(6))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccountLocked(until) if until == t0() + Duration::minutes(19)));

        // lock has run out
        let outcome = login(&store, &config, "gw_lock", "password1", &client, t0() + Duration::minutes(20))
            .await
            .unwrap();
        assert_eq!(outcome.user.failed_login_attempts, 5);

        let user = store.find_user(outcome.user.id).await.unwrap().unwrap();
        assert_eq!(user.failed_login_attempts, 0);
        assert_eq!(user.locked_until, None);
    }

    #[actix_web::test]
    async fn simultaneous_failures_still_lock_the_account() {
        let store = MemoryStore::new();
        let config = Config::for_tests();
        let client = ClientInfo::default();
        let user = register(&store, &config, registration("gw_burst", "gw_burst@x.io", "password1"), &client, t0())
            .await
            .unwrap();

        let results = futures::future::join_all(
            (0..config.max_login_attempts)
                .map(|_| login(&store, &config, "gw_burst", "wrong-pass", &client, t0())),
        )
        .await;
        assert!(results.iter().all(|r| matches!(r, Err(ServiceError::InvalidCredential))));

        let stored = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, config.max_login_attempts);
        assert!(stored.is_locked(t0()));

        let err = login(&store, &config, "gw_burst", "password1", &client, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccountLocked(_)));
    }

    #[actix_web::test]
    async fn inactive_user_cannot_log_in() {
        let store = MemoryStore::new();
        let config = Config::for_tests();
        let client = ClientInfo::default();
        let user = register(&store, &config, registration("gw_off", "gw_off@x.io", "password1"), &client, t0())
            .await
            .unwrap();
        store.set_active(user.id, false).await.unwrap();

        let err = login(&store, &config, "gw_off", "password1", &client, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccountInactive));
    }

    #[actix_web::test]
    async fn unknown_user_is_an_invalid_credential() {
        let store = MemoryStore::new();
        let err = login(&store, &Config::for_tests(), "ghost", "password1", &ClientInfo::default(), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredential));
    }

    #[actix_web::test]
    async fn profile_email_must_stay_unique() {
        let store = MemoryStore::new();
        let config = Config::for_tests();
        let client = ClientInfo::default();
        let first = register(&store, &config, registration("gw_p1", "gw_p1@x.io", "password1"), &client, t0())
            .await
            .unwrap();
        register(&store, &config, registration("gw_p2", "gw_p2@x.io", "password1"), &client, t0())
            .await
            .unwrap();

        let err = update_profile(
            &store,
            &first,
            ProfileUpdate { email: Some("gw_p2@x.io".into()), ..Default::default() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateIdentity("email")));

        let updated = update_profile(
            &store,
            &first,
            ProfileUpdate { full_name: Some("  Renamed  ".into()), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(updated.full_name, "Renamed");
    }

    #[actix_web::test]
    async fn configured_admins_are_promoted() {
        let store = MemoryStore::new();
        let config = Config::for_tests();
        let user = register(&store, &config, registration("gw_boss", "gw_boss@x.io", "password1"), &ClientInfo::default(), t0())
            .await
            .unwrap();
        assert!(!user.is_admin);

        ensure_admins(&store, &["gw_boss".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert!(store.find_user(user.id).await.unwrap().unwrap().is_admin);
    }
}
