use anyhow::Result;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use tracing;

use adpulse_core::db::DbConnection;
use adpulse_core::schema::{dropi_orders, wallet_movements};
use adpulse_core::WalletCategory;

#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub orders_marked_paid: usize,
    pub orders_marked_charged: usize,
    /// Movements whose referenced order is not in this user's cache —
    /// either not yet synced or belonging to someone else. Never applied.
    pub unmatched_references: usize,
}

/// Cross-reference cached wallet movements against cached orders.
///
/// Profit credits flip the referenced order to paid; freight-charge debits
/// flip it to return-charged. Every UPDATE is conditioned on the flag
/// still being false and scoped to the syncing user, so a second pass (or
/// a concurrent run) can never double-mark, and a movement pointing at
/// another user's order matches nothing.
pub async fn reconcile_user(conn: &mut DbConnection, user_id: i64) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    let credits: Vec<(i64, Option<i64>, BigDecimal, Option<DateTime<Utc>>)> =
        wallet_movements::table
            .filter(wallet_movements::user_id.eq(user_id))
            .filter(wallet_movements::category.eq(WalletCategory::GananciaDropshipping.as_str()))
            .filter(wallet_movements::order_reference.is_not_null())
            .select((
                wallet_movements::id,
                wallet_movements::order_reference,
                wallet_movements::amount,
                wallet_movements::moved_at,
            ))
            .load(conn)
            .await?;

    for (movement_id, order_ref, amount, moved_at) in credits {
        let Some(order_ref) = order_ref else { continue };

        let updated = diesel::update(
            dropi_orders::table
                .filter(dropi_orders::user_id.eq(user_id))
                .filter(dropi_orders::external_id.eq(order_ref))
                .filter(dropi_orders::is_paid.eq(false)),
        )
        .set((
            dropi_orders::is_paid.eq(true),
            dropi_orders::paid_at.eq(moved_at.unwrap_or_else(Utc::now)),
            dropi_orders::paid_amount.eq(Some(amount)),
            dropi_orders::wallet_movement_id.eq(Some(movement_id)),
        ))
        .execute(conn)
        .await?;

        if updated > 0 {
            report.orders_marked_paid += updated;
        } else if !order_exists(conn, user_id, order_ref).await? {
            report.unmatched_references += 1;
        }
        // updated == 0 with an existing order means it is already paid;
        // the flag is monotonic and stays put.
    }

    let charges: Vec<(i64, Option<i64>, BigDecimal, Option<DateTime<Utc>>)> =
        wallet_movements::table
            .filter(wallet_movements::user_id.eq(user_id))
            .filter(wallet_movements::category.eq(WalletCategory::CobroFlete.as_str()))
            .filter(wallet_movements::order_reference.is_not_null())
            .select((
                wallet_movements::id,
                wallet_movements::order_reference,
                wallet_movements::amount,
                wallet_movements::moved_at,
            ))
            .load(conn)
            .await?;

    for (_movement_id, order_ref, amount, moved_at) in charges {
        let Some(order_ref) = order_ref else { continue };

        let updated = diesel::update(
            dropi_orders::table
                .filter(dropi_orders::user_id.eq(user_id))
                .filter(dropi_orders::external_id.eq(order_ref))
                .filter(dropi_orders::is_return_charged.eq(false)),
        )
        .set((
            dropi_orders::is_return_charged.eq(true),
            dropi_orders::charged_at.eq(moved_at.unwrap_or_else(Utc::now)),
            dropi_orders::charged_amount.eq(Some(amount)),
        ))
        .execute(conn)
        .await?;

        if updated > 0 {
            report.orders_marked_charged += updated;
        } else if !order_exists(conn, user_id, order_ref).await? {
            report.unmatched_references += 1;
        }
    }

    tracing::debug!(
        "Reconciled user {}: {} paid, {} charged, {} unmatched",
        user_id,
        report.orders_marked_paid,
        report.orders_marked_charged,
        report.unmatched_references
    );

    Ok(report)
}

async fn order_exists(conn: &mut DbConnection, user_id: i64, external_id: i64) -> Result<bool> {
    let count: i64 = dropi_orders::table
        .filter(dropi_orders::user_id.eq(user_id))
        .filter(dropi_orders::external_id.eq(external_id))
        .count()
        .get_result(conn)
        .await?;
    Ok(count > 0)
}
