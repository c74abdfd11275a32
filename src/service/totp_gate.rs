use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::{auth::ClientInfo, totp},
    error::ServiceError,
    model::{
        audit::{EventType, Severity},
        user::User,
    },
    service::audit,
    store::Store,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct TotpSetup {
    /// Base32 secret for manual entry
    #[schema(example = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP")]
    pub secret: String,
    /// `otpauth://` URI; the client renders it as a QR code
    pub provisioning_uri: String,
    pub message: &'static str,
}

/// Issues a fresh secret. The factor stays disabled until a code is verified.
pub async fn setup(
    store: &dyn Store,
    issuer: &str,
    user: &User,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<TotpSetup, ServiceError> {
    let secret = totp::generate_secret();
    store.set_totp(user.id, &secret, false).await?;

    audit::record_event(
        store,
        Some(user.id),
        EventType::TotpSetup,
        Severity::Info,
        "TOTP secret issued",
        client,
        now,
    )
    .await;

    Ok(TotpSetup {
        provisioning_uri: totp::provisioning_uri(&secret, &user.username, issuer),
        secret,
        message: "Scan QR code with authenticator app",
    })
}

async fn check_code(
    store: &dyn Store,
    user: &User,
    secret: &str,
    code: &str,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if totp::verify(secret, code, now.timestamp()) {
        return Ok(());
    }

    audit::record_event(
        store,
        Some(user.id),
        EventType::TotpFailure,
        Severity::Warning,
        "Invalid TOTP code submitted",
        client,
        now,
    )
    .await;
    Err(ServiceError::InvalidCode)
}

/// First successful code after setup enables the factor.
pub async fn verify_setup(
    store: &dyn Store,
    user: &User,
    code: &str,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let secret = user
        .totp_secret
        .as_deref()
        .ok_or(ServiceError::TotpNotConfigured)?;

    check_code(store, user, secret, code, client, now).await?;

    if !user.totp_enabled {
        store.set_totp(user.id, secret, true).await?;
        info!(user_id = user.id, "TOTP enabled");
        audit::record_event(
            store,
            Some(user.id),
            EventType::TotpEnabled,
            Severity::Info,
            "TOTP enabled",
            client,
            now,
        )
        .await;
    }
    Ok(())
}

/// Second-factor check for a user whose TOTP is already enabled.
pub async fn verify(
    store: &dyn Store,
    user: &User,
    code: &str,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    match (&user.totp_secret, user.totp_enabled) {
        (Some(secret), true) => check_code(store, user, secret, code, client, now).await,
        _ => Err(ServiceError::TotpNotConfigured),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::audit::EventFilter,
        service::testing::{seed_user, t0},
        store::MemoryStore,
    };
    use chrono::Duration;

    #[actix_web::test]
    async fn setup_then_first_valid_code_enables() {
        let store = MemoryStore::new();
        let client = ClientInfo::default();
        let user = seed_user(&store, "totp_a").await;

        let issued = setup(&store, "MFA Attendance System", &user, &client, t0())
            .await
            .unwrap();
        assert!(issued.provisioning_uri.starts_with("otpauth://totp/"));

        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert!(!user.totp_enabled);
        assert!(matches!(
            verify(&store, &user, "000000", &client, t0()).await,
            Err(ServiceError::TotpNotConfigured)
        ));

        let code = totp::code_at(&issued.secret, t0().timestamp()).unwrap();
        verify_setup(&store, &user, &code, &client, t0()).await.unwrap();

        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert!(user.totp_enabled);

        let later = t0() + Duration::minutes(5);
        let code = totp::code_at(&issued.secret, later.timestamp()).unwrap();
        verify(&store, &user, &code, &client, later).await.unwrap();
    }

    #[actix_web::test]
    async fn wrong_code_is_rejected_and_audited() {
        let store = MemoryStore::new();
        let client = ClientInfo::default();
        let user = seed_user(&store, "totp_b").await;
        let issued = setup(&store, "Acme", &user, &client, t0()).await.unwrap();
        let user = store.find_user(user.id).await.unwrap().unwrap();

        let nearby: Vec<String> = [-30, 0, 30]
            .iter()
            .map(|d| totp::code_at(&issued.secret, t0().timestamp() + d).unwrap())
            .collect();
        let bad = ["123456", "654321", "111111", "999999"]
            .into_iter()
            .find(|c| !nearby.iter().any(|n| n.as_str() == *c))
            .unwrap();

        assert!(matches!(
            verify_setup(&store, &user, bad, &client, t0()).await,
            Err(ServiceError::InvalidCode)
        ));
        assert!(!store.find_user(user.id).await.unwrap().unwrap().totp_enabled);

        let failures = store
            .list_security_events(&EventFilter {
                event_type: Some(EventType::TotpFailure.to_string()),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
    }

    #[actix_web::test]
    async fn verification_without_setup_is_refused() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "totp_c").await;

        assert!(matches!(
            verify_setup(&store, &user, "123456", &ClientInfo::default(), t0()).await,
            Err(ServiceError::TotpNotConfigured)
        ));
    }
}
