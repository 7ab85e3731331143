use std::sync::Arc;

use crate::config::Config;
use crate::db::{create_pool as create_db_pool, DbPool};
use crate::guard::SyncGuard;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub db_pool: Arc<DbPool>,
    pub sync_guard: SyncGuard,
}

impl AppContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db_pool = create_db_pool(&config.database).await?;

        Ok(AppContext {
            config: Arc::new(config),
            db_pool,
            sync_guard: SyncGuard::new(),
        })
    }
}
