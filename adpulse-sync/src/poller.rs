use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use std::time::Duration;
use tracing;

use adpulse_core::schema::platform_connections;
use adpulse_core::types::SyncStatus;
use adpulse_core::AppContext;

use crate::orchestrator::run_user_sync;

const POLL_INTERVAL_SECS: u64 = 60;

/// Background scheduler: periodically picks connections whose last sync
/// attempt is older than the configured interval and runs them.
pub async fn run(ctx: AppContext) -> Result<()> {
    tracing::info!("Starting sync scheduler poller");

    loop {
        match poll_due_connections(&ctx).await {
            Ok(_) => {
                tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
            }
            Err(e) => {
                tracing::error!("Error in sync scheduler: {}", e);
                tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
            }
        }
    }
}

async fn poll_due_connections(ctx: &AppContext) -> Result<()> {
    let mut conn = ctx.db_pool.get().await?;

    // updated_at moves on every attempt, so error rows wait a full
    // interval too instead of hot-looping
    let cutoff = Utc::now() - ChronoDuration::minutes(ctx.config.sync.interval_minutes);
    let due_users: Vec<i64> = platform_connections::table
        .filter(platform_connections::active.eq(true))
        .filter(platform_connections::sync_status.ne(SyncStatus::Syncing.as_str()))
        .filter(platform_connections::updated_at.lt(cutoff))
        .select(platform_connections::user_id)
        .distinct()
        .load(&mut conn)
        .await?;
    drop(conn);

    if due_users.is_empty() {
        return Ok(());
    }

    tracing::debug!("{} users due for scheduled sync", due_users.len());

    for user_id in due_users {
        let Some(_permit) = ctx.sync_guard.try_acquire(user_id) else {
            continue;
        };
        if let Err(e) = run_user_sync(ctx, user_id).await {
            tracing::error!("Scheduled sync for user {} failed: {}", user_id, e);
        }
    }

    Ok(())
}
