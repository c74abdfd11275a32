use std::sync::Arc;

use anyhow::Context;
use sqlx::MySqlPool;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    store::{MemoryStore, MySqlStore, Store},
    utils::identity_filter,
};

pub async fn init_db(database_url: &str) -> anyhow::Result<MySqlPool> {
    let pool = MySqlPool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(pool)
}

/// Opens the configured store. MySQL stores also get their identity filter warmed in the background.
pub async fn init_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    if config.uses_memory_store() {
        warn!("Using in-memory store; data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = init_db(&config.database_url).await?;
    info!("Database ready");

    let pool_for_filter_warmup = pool.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = identity_filter::warmup_identity_filter(&pool_for_filter_warmup, 100).await {
            error!(error = ?e, "Failed to warm up identity filter");
        }
    });

    Ok(Arc::new(MySqlStore::new(pool)))
}
