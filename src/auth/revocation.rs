use moka::future::Cache;
use std::time::Duration;

/// Token ids revoked by logout. Entries expire with the token itself, so the cache
/// never holds more than one access-token lifetime of logouts.
#[derive(Clone)]
pub struct RevokedTokens {
    cache: Cache<String, ()>,
}

impl RevokedTokens {
    pub fn new(token_ttl_secs: usize) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(500_000) // tune based on memory
                .time_to_live(Duration::from_secs(token_ttl_secs as u64))
                .build(),
        }
    }

    pub async fn revoke(&self, jti: &str) {
        self.cache.insert(jti.to_string(), ()).await;
    }

    pub async fn is_revoked(&self, jti: &str) -> bool {
        self.cache.get(jti).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn revoked_ids_are_remembered() {
        let revoked = RevokedTokens::new(60);
        assert!(!revoked.is_revoked("abc").await);

        revoked.revoke("abc").await;
        assert!(revoked.is_revoked("abc").await);
        assert!(!revoked.is_revoked("def").await);
    }
}
