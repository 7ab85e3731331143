use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use serde_json::Value;
use tracing;

use adpulse_core::db::DbConnection;
use adpulse_core::schema::{crm_contacts, dropi_orders, platform_connections, wallet_movements};
use adpulse_core::types::{PlatformConnection, SyncStatus};
use adpulse_core::{decrypt_credentials, AppContext};
use adpulse_connectors::dropi::{DropiClient, DropiCredentials};
use adpulse_connectors::error::FetchError;
use adpulse_connectors::lucidbot::{ContactFilter, LucidbotClient, CONTACT_PAGE_SIZE};
use adpulse_connectors::paginate::fetch_all;

use crate::reconcile::{reconcile_user, ReconcileReport};
use crate::upsert::{self, SinkReport};

pub const DROPI_PLATFORM: &str = "dropi";
pub const LUCIDBOT_PLATFORM: &str = "lucidbot";

const PAGE_SIZE: u32 = 100;
const MAX_PAGES: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
}

/// Trigger a background sync for one user. Returns immediately; the run
/// proceeds in a spawned task holding the user's single-flight permit.
pub fn spawn_user_sync(ctx: &AppContext, user_id: i64) -> TriggerOutcome {
    match ctx.sync_guard.try_acquire(user_id) {
        None => TriggerOutcome::AlreadyRunning,
        Some(permit) => {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = run_user_sync(&ctx, user_id).await {
                    tracing::error!("Background sync for user {} failed: {}", user_id, e);
                }
            });
            TriggerOutcome::Started
        }
    }
}

/// Run every active connection of one user, strictly sequentially.
/// Stage failures are recorded on the connection row; only infrastructure
/// failures (pool exhaustion and the like) bubble out of here.
pub async fn run_user_sync(ctx: &AppContext, user_id: i64) -> Result<()> {
    let mut db = ctx.db_pool.get().await?;
    let dropi = load_connection(&mut db, user_id, DROPI_PLATFORM).await?;
    let lucid = load_connection(&mut db, user_id, LUCIDBOT_PLATFORM).await?;
    drop(db);

    if dropi.is_none() && lucid.is_none() {
        tracing::warn!("No active connections for user {}, nothing to sync", user_id);
        return Ok(());
    }

    if let Some(connection) = dropi {
        run_dropi_sync(ctx, &connection).await?;
    }
    if let Some(connection) = lucid {
        run_lucidbot_sync(ctx, &connection).await?;
    }

    Ok(())
}

/// Sync every user with an active connection, one after the other. Users
/// with a run already in flight are skipped.
pub async fn sync_all_users(ctx: &AppContext) -> Result<usize> {
    let mut db = ctx.db_pool.get().await?;
    let user_ids: Vec<i64> = platform_connections::table
        .filter(platform_connections::active.eq(true))
        .select(platform_connections::user_id)
        .distinct()
        .load(&mut db)
        .await?;
    drop(db);

    let mut started = 0;
    for uid in user_ids {
        let Some(_permit) = ctx.sync_guard.try_acquire(uid) else {
            tracing::debug!("Sync already in flight for user {}, skipping", uid);
            continue;
        };
        match run_user_sync(ctx, uid).await {
            Ok(_) => started += 1,
            Err(e) => tracing::error!("Bulk sync for user {} failed: {}", uid, e),
        }
    }
    Ok(started)
}

#[derive(Debug, Default, Serialize)]
pub struct ClearReport {
    pub orders_deleted: usize,
    pub movements_deleted: usize,
    pub contacts_deleted: usize,
}

/// Drop every cached row for a user and reset their connections to
/// pending. The only path that un-flips reconciliation flags.
pub async fn clear_user_data(ctx: &AppContext, user_id: i64) -> Result<ClearReport> {
    let mut db = ctx.db_pool.get().await?;

    let orders_deleted = diesel::delete(
        dropi_orders::table.filter(dropi_orders::user_id.eq(user_id)),
    )
    .execute(&mut db)
    .await?;
    let movements_deleted = diesel::delete(
        wallet_movements::table.filter(wallet_movements::user_id.eq(user_id)),
    )
    .execute(&mut db)
    .await?;
    let contacts_deleted = diesel::delete(
        crm_contacts::table.filter(crm_contacts::user_id.eq(user_id)),
    )
    .execute(&mut db)
    .await?;

    diesel::update(
        platform_connections::table.filter(platform_connections::user_id.eq(user_id)),
    )
    .set((
        platform_connections::sync_status.eq(SyncStatus::Pending.as_str()),
        platform_connections::last_error.eq(None::<String>),
        platform_connections::last_orders_sync_at.eq(None::<DateTime<Utc>>),
        platform_connections::last_wallet_sync_at.eq(None::<DateTime<Utc>>),
        platform_connections::last_contacts_sync_at.eq(None::<DateTime<Utc>>),
        platform_connections::updated_at.eq(Utc::now()),
    ))
    .execute(&mut db)
    .await?;

    tracing::info!(
        "Cleared cached data for user {}: {} orders, {} movements, {} contacts",
        user_id,
        orders_deleted,
        movements_deleted,
        contacts_deleted
    );

    Ok(ClearReport {
        orders_deleted,
        movements_deleted,
        contacts_deleted,
    })
}

/// First sync pulls full history (no bound); later syncs pull a bounded
/// recent window.
fn incremental_since(
    last_sync: Option<DateTime<Utc>>,
    window_days: i64,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    last_sync.map(|_| now - Duration::days(window_days))
}

async fn load_connection(
    conn: &mut DbConnection,
    user_id: i64,
    platform: &str,
) -> Result<Option<PlatformConnection>> {
    let connection = platform_connections::table
        .filter(platform_connections::user_id.eq(user_id))
        .filter(platform_connections::platform.eq(platform))
        .filter(platform_connections::active.eq(true))
        .select(PlatformConnection::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(connection)
}

async fn set_status(
    conn: &mut DbConnection,
    connection_id: i64,
    status: SyncStatus,
    error: Option<String>,
) -> Result<()> {
    diesel::update(platform_connections::table.filter(platform_connections::id.eq(connection_id)))
        .set((
            platform_connections::sync_status.eq(status.as_str()),
            platform_connections::last_error.eq(error),
            platform_connections::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

async fn run_dropi_sync(ctx: &AppContext, connection: &PlatformConnection) -> Result<()> {
    let mut db = ctx.db_pool.get().await?;
    set_status(&mut db, connection.id, SyncStatus::Syncing, None).await?;

    match dropi_stages(ctx, &mut db, connection).await {
        Ok((orders, wallet, reconciled)) => {
            let now = Utc::now();
            diesel::update(
                platform_connections::table.filter(platform_connections::id.eq(connection.id)),
            )
            .set((
                platform_connections::sync_status.eq(SyncStatus::Completed.as_str()),
                platform_connections::last_error.eq(None::<String>),
                platform_connections::last_orders_sync_at.eq(Some(now)),
                platform_connections::last_wallet_sync_at.eq(Some(now)),
                platform_connections::updated_at.eq(now),
            ))
            .execute(&mut db)
            .await?;

            tracing::info!(
                "Dropi sync completed for user {}: {} orders upserted ({} skipped, {} failed), \
                 {} movements upserted, {} marked paid, {} marked charged",
                connection.user_id,
                orders.upserted,
                orders.skipped,
                orders.failed,
                wallet.upserted,
                reconciled.orders_marked_paid,
                reconciled.orders_marked_charged
            );
        }
        Err(e) => {
            // Committed batches from earlier pages are kept; only the
            // connection state records the failure.
            tracing::error!("Dropi sync failed for user {}: {}", connection.user_id, e);
            set_status(&mut db, connection.id, SyncStatus::Error, Some(e.to_string())).await?;
        }
    }

    Ok(())
}

async fn dropi_stages(
    ctx: &AppContext,
    db: &mut DbConnection,
    connection: &PlatformConnection,
) -> Result<(SinkReport, SinkReport, ReconcileReport)> {
    let client = DropiClient::new(&ctx.config.dropi)?;

    let scope = format!("{}:{}", DROPI_PLATFORM, connection.user_id);
    let credentials_json = decrypt_credentials(
        &connection.credentials,
        &scope,
        &ctx.config.server.encryption_key,
    )?;
    let credentials: DropiCredentials = serde_json::from_str(&credentials_json)?;

    // The cached token is never trusted; every run starts with a login.
    let mut token = client.login(&credentials).await?;

    let now = Utc::now();
    let orders_since = incremental_since(
        connection.last_orders_sync_at,
        ctx.config.sync.orders_window_days,
        now,
    );
    let order_items =
        fetch_orders_with_reauth(&client, &credentials, &mut token, orders_since).await?;
    let orders_report = upsert::upsert_orders(db, connection.user_id, &order_items).await?;

    let wallet_since = incremental_since(
        connection.last_wallet_sync_at,
        ctx.config.sync.wallet_window_days,
        now,
    );
    let wallet_items =
        fetch_wallet_with_reauth(&client, &credentials, &mut token, wallet_since).await?;
    let wallet_report = upsert::upsert_movements(db, connection.user_id, &wallet_items).await?;

    let reconcile_report = reconcile_user(db, connection.user_id).await?;

    Ok((orders_report, wallet_report, reconcile_report))
}

/// A token rejected mid-run gets exactly one fresh login and stage retry;
/// any other failure aborts the stage.
async fn fetch_orders_with_reauth(
    client: &DropiClient,
    credentials: &DropiCredentials,
    token: &mut String,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<Value>, FetchError> {
    let first = {
        let source = client.orders_source(token.as_str(), since);
        fetch_all(&source, PAGE_SIZE, MAX_PAGES).await
    };
    match first {
        Err(FetchError::Expired) => {
            tracing::warn!("Dropi token rejected mid-run, re-authenticating");
            *token = client.login(credentials).await?;
            let source = client.orders_source(token.as_str(), since);
            fetch_all(&source, PAGE_SIZE, MAX_PAGES).await
        }
        other => other,
    }
}

async fn fetch_wallet_with_reauth(
    client: &DropiClient,
    credentials: &DropiCredentials,
    token: &mut String,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<Value>, FetchError> {
    let first = {
        let source = client.wallet_source(token.as_str(), since);
        fetch_all(&source, PAGE_SIZE, MAX_PAGES).await
    };
    match first {
        Err(FetchError::Expired) => {
            tracing::warn!("Dropi token rejected mid-run, re-authenticating");
            *token = client.login(credentials).await?;
            let source = client.wallet_source(token.as_str(), since);
            fetch_all(&source, PAGE_SIZE, MAX_PAGES).await
        }
        other => other,
    }
}

async fn run_lucidbot_sync(ctx: &AppContext, connection: &PlatformConnection) -> Result<()> {
    let mut db = ctx.db_pool.get().await?;
    set_status(&mut db, connection.id, SyncStatus::Syncing, None).await?;

    match lucidbot_stage(ctx, &mut db, connection).await {
        Ok(report) => {
            let now = Utc::now();
            diesel::update(
                platform_connections::table.filter(platform_connections::id.eq(connection.id)),
            )
            .set((
                platform_connections::sync_status.eq(SyncStatus::Completed.as_str()),
                platform_connections::last_error.eq(None::<String>),
                platform_connections::last_contacts_sync_at.eq(Some(now)),
                platform_connections::updated_at.eq(now),
            ))
            .execute(&mut db)
            .await?;

            tracing::info!(
                "LucidBot sync completed for user {}: {} contacts upserted ({} skipped)",
                connection.user_id,
                report.upserted,
                report.skipped
            );
        }
        Err(e) => {
            tracing::error!("LucidBot sync failed for user {}: {}", connection.user_id, e);
            set_status(&mut db, connection.id, SyncStatus::Error, Some(e.to_string())).await?;
        }
    }

    Ok(())
}

async fn lucidbot_stage(
    ctx: &AppContext,
    db: &mut DbConnection,
    connection: &PlatformConnection,
) -> Result<SinkReport> {
    let scope = format!("{}:{}", LUCIDBOT_PLATFORM, connection.user_id);
    let api_key = decrypt_credentials(
        &connection.credentials,
        &scope,
        &ctx.config.server.encryption_key,
    )?;
    let client = LucidbotClient::new(&ctx.config.lucidbot, &api_key)?;

    let filter = ContactFilter {
        ad_id: None,
        updated_since: incremental_since(
            connection.last_contacts_sync_at,
            ctx.config.sync.orders_window_days,
            Utc::now(),
        ),
    };
    let source = client.contacts_source(filter);
    let items = fetch_all(&source, CONTACT_PAGE_SIZE, MAX_PAGES).await?;

    upsert::upsert_contacts(db, connection.user_id, &items).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sync_is_unbounded() {
        assert_eq!(incremental_since(None, 30, Utc::now()), None);
    }

    #[test]
    fn test_later_syncs_are_windowed() {
        let now = Utc::now();
        let last = now - Duration::days(2);
        let since = incremental_since(Some(last), 30, now).unwrap();
        assert_eq!(since, now - Duration::days(30));
    }
}
