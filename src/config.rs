use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::face::FacePolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub api_prefix: String,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_protected_per_min: u32,

    // Credential policy
    pub password_min_length: usize,
    pub max_login_attempts: u32,
    pub lockout_window_minutes: i64,
    pub lockout_duration_minutes: i64,

    // Second factors
    pub totp_issuer: String,
    pub face_policy: FacePolicy,
    pub face_threshold: f64,
    pub max_image_bytes: usize,

    /// Usernames promoted to admin at startup
    pub admin_usernames: Vec<String>,

    pub log_dir: String,
    pub log_level: tracing::Level,
}

fn var_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value {raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let face_policy = var_or("FACE_MATCH_POLICY", FacePolicy::Bytes)?;

        Ok(Self {
            server_addr: env::var("SERVER_ADDR").context("SERVER_ADDR must be set")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            access_token_ttl: var_or("ACCESS_TOKEN_TTL", 1800)?, // default 30 min
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            rate_login_per_min: var_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: var_or("RATE_REGISTER_PER_MIN", 30)?,
            rate_protected_per_min: var_or("RATE_PROTECTED_PER_MIN", 1000)?,

            password_min_length: var_or("PASSWORD_MIN_LENGTH", 8)?,
            max_login_attempts: var_or("MAX_LOGIN_ATTEMPTS", 5)?,
            lockout_window_minutes: var_or("LOCKOUT_WINDOW_MINUTES", 60)?,
            lockout_duration_minutes: var_or("LOCKOUT_DURATION_MINUTES", 15)?,

            totp_issuer: env::var("TOTP_ISSUER_NAME")
                .unwrap_or_else(|_| "MFA Attendance System".to_string()),
            face_policy,
            face_threshold: var_or("FACE_MATCH_THRESHOLD", face_policy.default_threshold())?,
            max_image_bytes: var_or("MAX_IMAGE_BYTES", 5 * 1024 * 1024)?,

            admin_usernames: env::var("ADMIN_USERNAMES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),

            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            log_level: var_or("LOG_LEVEL", tracing::Level::DEBUG)?,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory:")
    }

    /// Settings for tests: in-memory store, small limits, fixed secret.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "memory://".into(),
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            api_prefix: "/api".into(),
            rate_login_per_min: 1000,
            rate_register_per_min: 1000,
            rate_protected_per_min: 1000,
            password_min_length: 8,
            max_login_attempts: 5,
            lockout_window_minutes: 60,
            lockout_duration_minutes: 15,
            totp_issuer: "MFA Attendance System".into(),
            face_policy: FacePolicy::Bytes,
            face_threshold: 0.95,
            max_image_bytes: 5 * 1024 * 1024,
            admin_usernames: Vec::new(),
            log_dir: "logs".into(),
            log_level: tracing::Level::DEBUG,
        }
    }
}
