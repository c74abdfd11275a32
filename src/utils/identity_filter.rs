use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Expected capacity and false-positive rate.
/// Tune these based on real user counts.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Usernames and emails of registered users. A miss proves the identity is free;
/// a hit still needs the store to confirm.
static IDENTITY_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

#[inline]
fn username_key(username: &str) -> String {
    format!("u:{}", username.trim().to_lowercase())
}

#[inline]
fn email_key(email: &str) -> String {
    format!("e:{}", email.trim().to_lowercase())
}

// A poisoned lock only means a writer panicked mid-add; the filter is still usable.
fn read() -> RwLockReadGuard<'static, CuckooFilter<String>> {
    IDENTITY_FILTER.read().unwrap_or_else(|e| e.into_inner())
}

fn write() -> RwLockWriteGuard<'static, CuckooFilter<String>> {
    IDENTITY_FILTER.write().unwrap_or_else(|e| e.into_inner())
}

/// Check if either identity might be registered (false positives possible)
pub fn might_exist(username: &str, email: &str) -> bool {
    let filter = read();
    filter.contains(&username_key(username)) || filter.contains(&email_key(email))
}

/// Record a newly registered user
pub fn insert(username: &str, email: &str) {
    let mut filter = write();
    filter.add(&username_key(username));
    filter.add(&email_key(email));
}

/// Email changed on profile edit
pub fn replace_email(old: &str, new: &str) {
    let mut filter = write();
    filter.remove(&email_key(old));
    filter.add(&email_key(new));
}

/// Warm up the filter using streaming + batching
pub async fn warmup_identity_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream =
        sqlx::query_as::<_, (String, String)>("SELECT username, email FROM users").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size * 2);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (username, email) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(username_key(&username));
        batch.push(email_key(&email));
        total += 1;

        if batch.len() >= batch_size * 2 {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    log::info!("Identity filter warmup complete: {} users", total);
    Ok(())
}

/// Insert a batch of normalized keys
fn insert_batch(keys: &[String]) {
    let mut filter = write();
    for key in keys {
        filter.add(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_identities_are_found_case_insensitively() {
        insert("Filter_Alice", "Filter.Alice@Example.com");

        assert!(might_exist("filter_alice", "someone-else@example.com"));
        assert!(might_exist("nobody_here", "filter.alice@example.com"));
    }

    #[test]
    fn username_and_email_keys_do_not_collide() {
        insert("filter_bob", "filter_bob_mail@example.com");
        // the username "filter_bob" must not make an email of the same text look taken
        let filter = read();
        assert!(!filter.contains(&email_key("filter_bob")));
    }

    #[test]
    fn replaced_email_is_tracked() {
        insert("filter_carol", "carol.old@example.com");
        replace_email("carol.old@example.com", "carol.new@example.com");

        assert!(might_exist("unused_name_x", "carol.new@example.com"));
    }
}
