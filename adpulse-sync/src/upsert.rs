use anyhow::Result;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use serde_json::Value;
use tracing;

use adpulse_core::db::DbConnection;
use adpulse_core::money::parse_money_value;
use adpulse_core::types::{NewCrmContact, NewOrder, NewWalletMovement};
use adpulse_core::{Direction, OrderStatus, WalletCategory};
use adpulse_connectors::dropi::{id_of, text_of, DropiMovement, DropiOrder};
use adpulse_connectors::lucidbot::LucidContact;

/// Rows are committed in chunks of this size, not one statement per item.
const COMMIT_CHUNK: usize = 50;

/// Structured outcome of one sink pass; per-item failures are data here,
/// not log lines.
#[derive(Debug, Default, Serialize)]
pub struct SinkReport {
    pub fetched: usize,
    pub upserted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl SinkReport {
    fn skip(&mut self, reason: String) {
        self.skipped += 1;
        self.errors.push(reason);
    }

    fn fail(&mut self, reason: String) {
        self.failed += 1;
        self.errors.push(reason);
    }
}

/// Upstream timestamps arrive in several formats; unparseable ones are
/// dropped, never fatal.
pub fn parse_source_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

/// Map one raw order item to an insertable row. Items without a usable id
/// are a skip for the caller.
pub fn map_order(user_id: i64, item: &Value, now: DateTime<Utc>) -> Result<NewOrder, String> {
    let order = DropiOrder::parse(item).map_err(|e| format!("unparseable order: {}", e))?;

    let raw_status = order
        .status
        .as_ref()
        .map(|s| s.as_str().to_string())
        .unwrap_or_default();
    let status = OrderStatus::normalize(&raw_status);

    Ok(NewOrder {
        user_id,
        external_id: order.id,
        status: status.as_str().to_string(),
        raw_status,
        order_total: order
            .total
            .as_ref()
            .and_then(parse_money_value)
            .unwrap_or_default(),
        shipping_cost: order.shipping_cost.as_ref().and_then(parse_money_value),
        profit: order.profit.as_ref().and_then(parse_money_value),
        customer_name: order.customer_name,
        customer_phone: order.customer_phone,
        shipping_city: order.city,
        shipping_department: order.department,
        shipping_address: order.address,
        courier: order.courier.as_ref().and_then(text_of),
        source_created_at: order.created_at.as_deref().and_then(parse_source_date),
        source_updated_at: order.updated_at.as_deref().and_then(parse_source_date),
        delivered_at: order.delivered_at.as_deref().and_then(parse_source_date),
        returned_at: order.returned_at.as_deref().and_then(parse_source_date),
        is_paid: false,
        is_return_charged: false,
        raw_payload: item.clone(),
        first_synced_at: now,
        last_synced_at: now,
    })
}

/// Map one raw wallet ledger item. Direction drives the category fallback;
/// a movement without id or amount is a skip.
pub fn map_movement(
    user_id: i64,
    item: &Value,
    now: DateTime<Utc>,
) -> Result<NewWalletMovement, String> {
    let movement = DropiMovement::parse(item).map_err(|e| format!("unparseable movement: {}", e))?;

    let amount = movement
        .amount
        .as_ref()
        .and_then(parse_money_value)
        .ok_or_else(|| format!("movement {} has no parseable amount", movement.id))?;

    let direction = movement.movement_type.as_deref().and_then(Direction::parse);
    let description = movement.description.unwrap_or_default();
    let category = WalletCategory::categorize(&description, direction);

    Ok(NewWalletMovement {
        user_id,
        external_id: movement.id,
        direction: direction.map(|d| d.as_str().to_string()),
        description,
        amount,
        balance_after: movement.balance_after.as_ref().and_then(parse_money_value),
        order_reference: movement.order_reference.as_ref().and_then(id_of),
        category: category.as_str().to_string(),
        moved_at: movement.created_at.as_deref().and_then(parse_source_date),
        raw_payload: item.clone(),
        synced_at: now,
    })
}

/// Map one raw CRM contact; the lead/sale split happens here, at the
/// boundary, via the typed `ContactKind`.
pub fn map_contact(
    user_id: i64,
    item: &Value,
    now: DateTime<Utc>,
) -> Result<NewCrmContact, String> {
    let contact = LucidContact::parse(item).map_err(|e| format!("unparseable contact: {}", e))?;
    let external_id = contact
        .external_id()
        .ok_or_else(|| "contact has no usable id".to_string())?;

    let kind = contact.kind();

    Ok(NewCrmContact {
        user_id,
        external_id,
        name: contact.name.clone(),
        phone: contact.phone.clone(),
        ad_id: contact.ad_id(),
        amount_paid: kind.sale_amount().cloned(),
        product: contact.product(),
        qualification: contact.qualification(),
        source_created_at: contact.created_at.as_deref().and_then(parse_source_date),
        synced_at: now,
    })
}

/// Insert-or-update fetched orders keyed by (user_id, external_id).
/// Identity, first-sighting and reconciliation fields are never refreshed
/// on conflict, so re-running with the same batch changes nothing and a
/// paid flag survives later syncs.
pub async fn upsert_orders(
    conn: &mut DbConnection,
    user_id: i64,
    items: &[Value],
) -> Result<SinkReport> {
    let now = Utc::now();
    let mut report = SinkReport {
        fetched: items.len(),
        ..Default::default()
    };

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        match map_order(user_id, item, now) {
            Ok(row) => rows.push(row),
            Err(reason) => report.skip(reason),
        }
    }

    for chunk in rows.chunks(COMMIT_CHUNK) {
        match insert_order_chunk(conn, chunk).await {
            Ok(n) => report.upserted += n,
            Err(e) => {
                // Isolate the bad row; the rest of the chunk still lands
                tracing::warn!("Order chunk failed ({}), retrying row by row", e);
                for row in chunk {
                    match insert_order_chunk(conn, std::slice::from_ref(row)).await {
                        Ok(n) => report.upserted += n,
                        Err(e) => report.fail(format!("order {}: {}", row.external_id, e)),
                    }
                }
            }
        }
    }

    Ok(report)
}

async fn insert_order_chunk(
    conn: &mut DbConnection,
    rows: &[NewOrder],
) -> diesel::QueryResult<usize> {
    use adpulse_core::schema::dropi_orders::dsl::*;

    diesel::insert_into(dropi_orders)
        .values(rows)
        .on_conflict((user_id, external_id))
        .do_update()
        .set((
            status.eq(excluded(status)),
            raw_status.eq(excluded(raw_status)),
            order_total.eq(excluded(order_total)),
            shipping_cost.eq(excluded(shipping_cost)),
            profit.eq(excluded(profit)),
            customer_name.eq(excluded(customer_name)),
            customer_phone.eq(excluded(customer_phone)),
            shipping_city.eq(excluded(shipping_city)),
            shipping_department.eq(excluded(shipping_department)),
            shipping_address.eq(excluded(shipping_address)),
            courier.eq(excluded(courier)),
            source_updated_at.eq(excluded(source_updated_at)),
            delivered_at.eq(excluded(delivered_at)),
            returned_at.eq(excluded(returned_at)),
            raw_payload.eq(excluded(raw_payload)),
            last_synced_at.eq(excluded(last_synced_at)),
        ))
        .execute(conn)
        .await
}

/// Insert-or-update fetched wallet movements keyed by (user_id,
/// external_id).
pub async fn upsert_movements(
    conn: &mut DbConnection,
    user_id: i64,
    items: &[Value],
) -> Result<SinkReport> {
    let now = Utc::now();
    let mut report = SinkReport {
        fetched: items.len(),
        ..Default::default()
    };

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        match map_movement(user_id, item, now) {
            Ok(row) => rows.push(row),
            Err(reason) => report.skip(reason),
        }
    }

    for chunk in rows.chunks(COMMIT_CHUNK) {
        match insert_movement_chunk(conn, chunk).await {
            Ok(n) => report.upserted += n,
            Err(e) => {
                tracing::warn!("Movement chunk failed ({}), retrying row by row", e);
                for row in chunk {
                    match insert_movement_chunk(conn, std::slice::from_ref(row)).await {
                        Ok(n) => report.upserted += n,
                        Err(e) => report.fail(format!("movement {}: {}", row.external_id, e)),
                    }
                }
            }
        }
    }

    Ok(report)
}

async fn insert_movement_chunk(
    conn: &mut DbConnection,
    rows: &[NewWalletMovement],
) -> diesel::QueryResult<usize> {
    use adpulse_core::schema::wallet_movements::dsl::*;

    diesel::insert_into(wallet_movements)
        .values(rows)
        .on_conflict((user_id, external_id))
        .do_update()
        .set((
            direction.eq(excluded(direction)),
            description.eq(excluded(description)),
            amount.eq(excluded(amount)),
            balance_after.eq(excluded(balance_after)),
            order_reference.eq(excluded(order_reference)),
            category.eq(excluded(category)),
            moved_at.eq(excluded(moved_at)),
            raw_payload.eq(excluded(raw_payload)),
            synced_at.eq(excluded(synced_at)),
        ))
        .execute(conn)
        .await
}

/// Insert-or-update fetched CRM contacts keyed by (user_id, external_id).
pub async fn upsert_contacts(
    conn: &mut DbConnection,
    user_id: i64,
    items: &[Value],
) -> Result<SinkReport> {
    let now = Utc::now();
    let mut report = SinkReport {
        fetched: items.len(),
        ..Default::default()
    };

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        match map_contact(user_id, item, now) {
            Ok(row) => rows.push(row),
            Err(reason) => report.skip(reason),
        }
    }

    for chunk in rows.chunks(COMMIT_CHUNK) {
        match insert_contact_chunk(conn, chunk).await {
            Ok(n) => report.upserted += n,
            Err(e) => {
                tracing::warn!("Contact chunk failed ({}), retrying row by row", e);
                for row in chunk {
                    match insert_contact_chunk(conn, std::slice::from_ref(row)).await {
                        Ok(n) => report.upserted += n,
                        Err(e) => report.fail(format!("contact {}: {}", row.external_id, e)),
                    }
                }
            }
        }
    }

    Ok(report)
}

async fn insert_contact_chunk(
    conn: &mut DbConnection,
    rows: &[NewCrmContact],
) -> diesel::QueryResult<usize> {
    use adpulse_core::schema::crm_contacts::dsl::*;

    diesel::insert_into(crm_contacts)
        .values(rows)
        .on_conflict((user_id, external_id))
        .do_update()
        .set((
            name.eq(excluded(name)),
            phone.eq(excluded(phone)),
            ad_id.eq(excluded(ad_id)),
            amount_paid.eq(excluded(amount_paid)),
            product.eq(excluded(product)),
            qualification.eq(excluded(qualification)),
            synced_at.eq(excluded(synced_at)),
        ))
        .execute(conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_source_date_formats() {
        assert!(parse_source_date("2024-05-01T13:22:10Z").is_some());
        assert!(parse_source_date("2024-05-01 13:22:10").is_some());
        assert!(parse_source_date("2024-05-01").is_some());
        assert!(parse_source_date("01/05/2024").is_none());
        assert!(parse_source_date("").is_none());
    }

    #[test]
    fn test_map_order_normalizes_and_parses() {
        let now = Utc::now();
        let item = serde_json::json!({
            "id": 4821,
            "status": {"name": "Entregado"},
            "total_order": "89.900",
            "dropshipper_profit": "32.000",
            "client_name": "Ana Pérez",
            "created_date": "2024-05-01 13:22:10"
        });
        let row = map_order(7, &item, now).unwrap();
        assert_eq!(row.user_id, 7);
        assert_eq!(row.external_id, 4821);
        assert_eq!(row.status, "ENTREGADO");
        assert_eq!(row.raw_status, "Entregado");
        assert_eq!(row.order_total, BigDecimal::from_str("89900").unwrap());
        assert_eq!(row.profit, Some(BigDecimal::from_str("32000").unwrap()));
        assert!(!row.is_paid);
        assert!(row.source_created_at.is_some());
    }

    #[test]
    fn test_map_order_without_id_is_skipped() {
        let item = serde_json::json!({"status": "ENTREGADO"});
        assert!(map_order(7, &item, Utc::now()).is_err());
    }

    #[test]
    fn test_map_order_missing_total_defaults_to_zero() {
        let item = serde_json::json!({"id": 1, "status": "EN RUTA"});
        let row = map_order(7, &item, Utc::now()).unwrap();
        assert_eq!(row.order_total, BigDecimal::default());
    }

    #[test]
    fn test_map_movement_derives_category() {
        let item = serde_json::json!({
            "id": 99,
            "type": "ENTRADA",
            "description": "Ganancia de Dropshipping orden #4821",
            "amount": "52.000",
            "order_id": "4821",
            "date": "2024-05-03 08:00:00"
        });
        let row = map_movement(7, &item, Utc::now()).unwrap();
        assert_eq!(row.category, "ganancia_dropshipping");
        assert_eq!(row.direction.as_deref(), Some("ENTRADA"));
        assert_eq!(row.order_reference, Some(4821));
        assert_eq!(row.amount, BigDecimal::from_str("52000").unwrap());
    }

    #[test]
    fn test_map_movement_without_amount_is_skipped() {
        let item = serde_json::json!({"id": 99, "type": "ENTRADA", "description": "x"});
        assert!(map_movement(7, &item, Utc::now()).is_err());
    }

    #[test]
    fn test_map_contact_sale_and_lead() {
        let now = Utc::now();
        let sale = serde_json::json!({
            "id": 88123,
            "name": "Carlos",
            "custom_fields": {"Total a Pagar": "1.234.567", "ad_id": "120210998877"}
        });
        let row = map_contact(7, &sale, now).unwrap();
        assert_eq!(
            row.amount_paid,
            Some(BigDecimal::from_str("1234567").unwrap())
        );
        assert_eq!(row.ad_id.as_deref(), Some("120210998877"));

        let lead = serde_json::json!({"id": 88124, "name": "Luisa", "custom_fields": {}});
        let row = map_contact(7, &lead, now).unwrap();
        assert_eq!(row.amount_paid, None);
    }
}
