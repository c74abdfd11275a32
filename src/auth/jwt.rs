use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::role::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub iat: usize,
    /// Token id; logout revokes by this value
    pub jti: String,
}

pub fn generate_access_token(
    user_id: u64,
    username: &str,
    role: Role,
    secret: &str,
    ttl: usize,
    now: DateTime<Utc>,
) -> Result<(String, Claims), Error> {
    let iat = now.timestamp().max(0) as usize;
    let claims = Claims {
        user_id,
        sub: username.to_string(),
        role: role.id(),
        exp: iat + ttl,
        iat,
        jti: Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn token_round_trips_claims() {
        let (token, issued) =
            generate_access_token(7, "jdoe", Role::Member, "s3cret", 900, Utc::now()).unwrap();
        let claims = verify_token(&token, "s3cret").unwrap();

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.sub, "jdoe");
        assert_eq!(claims.role, Role::Member.id());
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.exp, claims.iat + 900);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, _) =
            generate_access_token(1, "admin", Role::Admin, "one", 900, Utc::now()).unwrap();
        assert!(verify_token(&token, "two").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let issued_at = Utc::now() - Duration::hours(2);
        let (token, _) =
            generate_access_token(1, "jdoe", Role::Member, "s3cret", 60, issued_at).unwrap();
        assert!(verify_token(&token, "s3cret").is_err());
    }
}
