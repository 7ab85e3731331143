use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{crm_contacts, dropi_orders, platform_connections, wallet_movements};

/// Connection-level sync state machine: pending -> syncing -> completed,
/// or syncing -> error; both terminal states return to syncing on a new
/// trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Completed,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Completed => "completed",
            SyncStatus::Error => "error",
        }
    }

    pub fn from_db(value: &str) -> SyncStatus {
        match value {
            "syncing" => SyncStatus::Syncing,
            "completed" => SyncStatus::Completed,
            "error" => SyncStatus::Error,
            _ => SyncStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = dropi_orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub external_id: i64,
    pub status: String,
    pub raw_status: String,
    pub order_total: BigDecimal,
    pub shipping_cost: Option<BigDecimal>,
    pub profit: Option<BigDecimal>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_department: Option<String>,
    pub shipping_address: Option<String>,
    pub courier: Option<String>,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_amount: Option<BigDecimal>,
    pub wallet_movement_id: Option<i64>,
    pub is_return_charged: bool,
    pub charged_at: Option<DateTime<Utc>>,
    pub charged_amount: Option<BigDecimal>,
    pub raw_payload: serde_json::Value,
    pub first_synced_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = dropi_orders)]
pub struct NewOrder {
    pub user_id: i64,
    pub external_id: i64,
    pub status: String,
    pub raw_status: String,
    pub order_total: BigDecimal,
    pub shipping_cost: Option<BigDecimal>,
    pub profit: Option<BigDecimal>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_department: Option<String>,
    pub shipping_address: Option<String>,
    pub courier: Option<String>,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub is_paid: bool,
    pub is_return_charged: bool,
    pub raw_payload: serde_json::Value,
    pub first_synced_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = wallet_movements)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WalletMovement {
    pub id: i64,
    pub user_id: i64,
    pub external_id: i64,
    pub direction: Option<String>,
    pub description: String,
    pub amount: BigDecimal,
    pub balance_after: Option<BigDecimal>,
    pub order_reference: Option<i64>,
    pub category: String,
    pub moved_at: Option<DateTime<Utc>>,
    pub raw_payload: serde_json::Value,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = wallet_movements)]
pub struct NewWalletMovement {
    pub user_id: i64,
    pub external_id: i64,
    pub direction: Option<String>,
    pub description: String,
    pub amount: BigDecimal,
    pub balance_after: Option<BigDecimal>,
    pub order_reference: Option<i64>,
    pub category: String,
    pub moved_at: Option<DateTime<Utc>>,
    pub raw_payload: serde_json::Value,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = platform_connections)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PlatformConnection {
    pub id: i64,
    pub user_id: i64,
    pub platform: String,
    pub credentials: String,
    pub last_orders_sync_at: Option<DateTime<Utc>>,
    pub last_wallet_sync_at: Option<DateTime<Utc>>,
    pub last_contacts_sync_at: Option<DateTime<Utc>>,
    pub sync_status: String,
    pub last_error: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = platform_connections)]
pub struct NewPlatformConnection {
    pub user_id: i64,
    pub platform: String,
    pub credentials: String,
    pub sync_status: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crm_contacts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CrmContact {
    pub id: i64,
    pub user_id: i64,
    pub external_id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub ad_id: Option<String>,
    pub amount_paid: Option<BigDecimal>,
    pub product: Option<String>,
    pub qualification: Option<String>,
    pub source_created_at: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crm_contacts)]
pub struct NewCrmContact {
    pub user_id: i64,
    pub external_id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub ad_id: Option<String>,
    pub amount_paid: Option<BigDecimal>,
    pub product: Option<String>,
    pub qualification: Option<String>,
    pub source_created_at: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
}

impl CrmContact {
    /// A contact with a positive paid amount is a sale; everything else is
    /// a lead.
    pub fn is_sale(&self) -> bool {
        use bigdecimal::Zero;
        self.amount_paid
            .as_ref()
            .map(|a| a > &BigDecimal::zero())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_round_trip() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Syncing,
            SyncStatus::Completed,
            SyncStatus::Error,
        ] {
            assert_eq!(SyncStatus::from_db(status.as_str()), status);
        }
        // Unknown text degrades to pending, never panics
        assert_eq!(SyncStatus::from_db("garbage"), SyncStatus::Pending);
    }
}
