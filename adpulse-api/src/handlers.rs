use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Json,
};
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use tracing;

use adpulse_core::encryption::encrypt_credentials;
use adpulse_core::schema::{crm_contacts, dropi_orders, platform_connections, wallet_movements};
use adpulse_core::types::{
    CrmContact, NewPlatformConnection, Order, PlatformConnection, SyncStatus, WalletMovement,
};
use adpulse_core::{AppContext, OrderStatus};
use adpulse_connectors::dropi::DropiCredentials;
use adpulse_sync::orchestrator::{DROPI_PLATFORM, LUCIDBOT_PLATFORM};
use adpulse_sync::{clear_user_data, spawn_user_sync, sync_all_users, TriggerOutcome};

use crate::auth::{self, AuthenticatedUser};

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "adpulse-api"
    }))
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub user_id: i64,
}

pub async fn generate_token(
    Extension(ctx): Extension<AppContext>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let token = auth::generate_token(req.user_id, &ctx.config.server.jwt_secret, 30)?;
    Ok(Json(serde_json::json!({ "token": token })))
}

#[derive(Deserialize)]
pub struct DropiConnectionRequest {
    pub email: String,
    pub password: String,
}

pub async fn upsert_dropi_connection(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<DropiConnectionRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let credentials = DropiCredentials {
        email: req.email,
        password: req.password,
    };
    let payload = serde_json::to_string(&credentials)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    save_connection(&ctx, user.user_id, DROPI_PLATFORM, &payload).await?;
    Ok(Json(serde_json::json!({"status": "ok", "platform": DROPI_PLATFORM})))
}

#[derive(Deserialize)]
pub struct LucidbotConnectionRequest {
    pub api_key: String,
}

pub async fn upsert_lucidbot_connection(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<LucidbotConnectionRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    save_connection(&ctx, user.user_id, LUCIDBOT_PLATFORM, &req.api_key).await?;
    Ok(Json(serde_json::json!({"status": "ok", "platform": LUCIDBOT_PLATFORM})))
}

/// Store (or replace) a platform credential, encrypted at rest, and reset
/// the connection's sync state to pending.
async fn save_connection(
    ctx: &AppContext,
    user_id: i64,
    platform: &str,
    plaintext_credentials: &str,
) -> Result<(), StatusCode> {
    let scope = format!("{}:{}", platform, user_id);
    let encrypted = encrypt_credentials(
        plaintext_credentials,
        &scope,
        &ctx.config.server.encryption_key,
    )
    .map_err(|e| {
        tracing::error!("Failed to encrypt credentials: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let mut conn = match ctx.db_pool.get().await {
        Ok(c) => c,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let now = Utc::now();
    let row = NewPlatformConnection {
        user_id,
        platform: platform.to_string(),
        credentials: encrypted.clone(),
        sync_status: SyncStatus::Pending.as_str().to_string(),
        active: true,
        created_at: now,
        updated_at: now,
    };

    let result = diesel::insert_into(platform_connections::table)
        .values(&row)
        .on_conflict((
            platform_connections::user_id,
            platform_connections::platform,
        ))
        .do_update()
        .set((
            platform_connections::credentials.eq(&encrypted),
            platform_connections::sync_status.eq(SyncStatus::Pending.as_str()),
            platform_connections::last_error.eq(None::<String>),
            platform_connections::active.eq(true),
            platform_connections::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::error!("Failed to save {} connection: {}", platform, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn trigger_sync(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match spawn_user_sync(&ctx, user.user_id) {
        TriggerOutcome::Started => Ok(Json(serde_json::json!({"status": "started"}))),
        TriggerOutcome::AlreadyRunning => {
            Ok(Json(serde_json::json!({"status": "already_running"})))
        }
    }
}

pub async fn trigger_sync_all(
    Extension(ctx): Extension<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let ctx_clone = ctx.clone();
    tokio::spawn(async move {
        match sync_all_users(&ctx_clone).await {
            Ok(started) => tracing::info!("Bulk sync finished, {} users synced", started),
            Err(e) => tracing::error!("Bulk sync failed: {}", e),
        }
    });
    Ok(Json(serde_json::json!({"status": "started"})))
}

pub async fn sync_status(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut conn = match ctx.db_pool.get().await {
        Ok(c) => c,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let connections: Vec<PlatformConnection> = match platform_connections::table
        .filter(platform_connections::user_id.eq(user.user_id))
        .select(PlatformConnection::as_select())
        .load(&mut conn)
        .await
    {
        Ok(c) => c,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let orders_count = count_rows(
        dropi_orders::table
            .filter(dropi_orders::user_id.eq(user.user_id))
            .count()
            .get_result(&mut conn)
            .await,
    )?;
    let paid_count = count_rows(
        dropi_orders::table
            .filter(dropi_orders::user_id.eq(user.user_id))
            .filter(dropi_orders::is_paid.eq(true))
            .count()
            .get_result(&mut conn)
            .await,
    )?;
    let movements_count = count_rows(
        wallet_movements::table
            .filter(wallet_movements::user_id.eq(user.user_id))
            .count()
            .get_result(&mut conn)
            .await,
    )?;
    let contacts_count = count_rows(
        crm_contacts::table
            .filter(crm_contacts::user_id.eq(user.user_id))
            .count()
            .get_result(&mut conn)
            .await,
    )?;
    let sales_count = count_rows(
        crm_contacts::table
            .filter(crm_contacts::user_id.eq(user.user_id))
            .filter(crm_contacts::amount_paid.gt(BigDecimal::zero()))
            .count()
            .get_result(&mut conn)
            .await,
    )?;

    // Credentials never leave the row
    let connections: Vec<serde_json::Value> = connections
        .into_iter()
        .map(|c| {
            serde_json::json!({
                "platform": c.platform,
                "sync_status": c.sync_status,
                "syncing": ctx.sync_guard.is_running(c.user_id),
                "last_error": c.last_error,
                "last_orders_sync_at": c.last_orders_sync_at,
                "last_wallet_sync_at": c.last_wallet_sync_at,
                "last_contacts_sync_at": c.last_contacts_sync_at,
                "active": c.active,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "connections": connections,
        "counts": {
            "orders": orders_count,
            "orders_paid": paid_count,
            "wallet_movements": movements_count,
            "contacts": contacts_count,
            "sales": sales_count,
        }
    })))
}

pub async fn clear_data(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match clear_user_data(&ctx, user.user_id).await {
        Ok(report) => Ok(Json(serde_json::json!({
            "status": "ok",
            "deleted": report,
        }))),
        Err(e) => {
            tracing::error!("Failed to clear data for user {}: {}", user.user_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Deserialize)]
pub struct OrdersQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list_orders(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<OrdersQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let limit = params.limit.unwrap_or(50).min(200);
    let offset = params.offset.unwrap_or(0);
    let mut conn = match ctx.db_pool.get().await {
        Ok(c) => c,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let mut query = dropi_orders::table
        .filter(dropi_orders::user_id.eq(user.user_id))
        .order(dropi_orders::source_created_at.desc())
        .limit(limit)
        .offset(offset)
        .select(Order::as_select())
        .into_boxed();

    if let Some(status) = &params.status {
        // Accept raw-ish input; store holds the normalized form
        let normalized = OrderStatus::normalize(status);
        query = query.filter(dropi_orders::status.eq(normalized.as_str()));
    }

    let orders: Vec<Order> = match query.load(&mut conn).await {
        Ok(o) => o,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    Ok(Json(serde_json::json!(orders)))
}

#[derive(Deserialize)]
pub struct MovementsQuery {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list_movements(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<MovementsQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let limit = params.limit.unwrap_or(50).min(200);
    let offset = params.offset.unwrap_or(0);
    let mut conn = match ctx.db_pool.get().await {
        Ok(c) => c,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let mut query = wallet_movements::table
        .filter(wallet_movements::user_id.eq(user.user_id))
        .order(wallet_movements::moved_at.desc())
        .limit(limit)
        .offset(offset)
        .select(WalletMovement::as_select())
        .into_boxed();

    if let Some(category) = &params.category {
        query = query.filter(wallet_movements::category.eq(category.clone()));
    }

    let movements: Vec<WalletMovement> = match query.load(&mut conn).await {
        Ok(m) => m,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    Ok(Json(serde_json::json!(movements)))
}

#[derive(Deserialize)]
pub struct ContactsQuery {
    #[serde(default)]
    pub ad_id: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list_contacts(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<ContactsQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let limit = params.limit.unwrap_or(50).min(200);
    let offset = params.offset.unwrap_or(0);
    let mut conn = match ctx.db_pool.get().await {
        Ok(c) => c,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let mut query = crm_contacts::table
        .filter(crm_contacts::user_id.eq(user.user_id))
        .order(crm_contacts::source_created_at.desc())
        .limit(limit)
        .offset(offset)
        .select(CrmContact::as_select())
        .into_boxed();

    if let Some(ad_id) = &params.ad_id {
        query = query.filter(crm_contacts::ad_id.eq(ad_id.clone()));
    }

    let contacts: Vec<CrmContact> = match query.load(&mut conn).await {
        Ok(c) => c,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let result: Vec<serde_json::Value> = contacts
        .into_iter()
        .map(|c| {
            let kind = if c.is_sale() { "sale" } else { "lead" };
            serde_json::json!({
                "id": c.id,
                "external_id": c.external_id,
                "name": c.name,
                "phone": c.phone,
                "ad_id": c.ad_id,
                "kind": kind,
                "amount_paid": c.amount_paid,
                "product": c.product,
                "qualification": c.qualification,
                "source_created_at": c.source_created_at,
                "synced_at": c.synced_at,
            })
        })
        .collect();

    Ok(Json(serde_json::json!(result)))
}

fn count_rows(result: Result<i64, diesel::result::Error>) -> Result<i64, StatusCode> {
    result.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
