use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing;

use adpulse_core::config::DropiConfig;

use crate::error::FetchError;
use crate::paginate::PageSource;

const LOGIN_PATH: &str = "/login";
const ORDERS_PATH: &str = "/orders/myorders";
const WALLET_PATH: &str = "/wallet/movements";

/// Decrypted Dropi credentials, stored encrypted on the connection row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropiCredentials {
    pub email: String,
    pub password: String,
}

/// HTTP client for the Dropi fulfillment platform. The bearer token from
/// `login` is short-lived (~24h); callers obtain a fresh one per sync run
/// and never persist it.
pub struct DropiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

impl DropiClient {
    pub fn new(config: &DropiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Exchange email+password for a bearer token. Rejected credentials
    /// surface as `FetchError::Expired`.
    pub async fn login(&self, credentials: &DropiCredentials) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "email": credentials.email,
                "password": credentials.password,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status.as_u16(), body));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(format!("login response: {}", e)))?;

        tracing::debug!("Dropi login succeeded");
        Ok(login.token)
    }

    /// One page of the order listing, raw JSON items for the sink to map.
    pub async fn list_orders(
        &self,
        token: &str,
        since: Option<DateTime<Utc>>,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Value>, FetchError> {
        let mut query: Vec<(&str, String)> = vec![
            ("result_number", limit.to_string()),
            ("start", offset.to_string()),
        ];
        if let Some(since) = since {
            query.push(("from", since.format("%Y-%m-%d").to_string()));
        }
        self.get_items(ORDERS_PATH, token, &query).await
    }

    /// One page of the wallet ledger.
    pub async fn list_wallet_movements(
        &self,
        token: &str,
        since: Option<DateTime<Utc>>,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Value>, FetchError> {
        let mut query: Vec<(&str, String)> = vec![
            ("result_number", limit.to_string()),
            ("start", offset.to_string()),
        ];
        if let Some(since) = since {
            query.push(("from", since.format("%Y-%m-%d").to_string()));
        }
        self.get_items(WALLET_PATH, token, &query).await
    }

    pub fn orders_source<'a>(
        &'a self,
        token: &'a str,
        since: Option<DateTime<Utc>>,
    ) -> DropiOrdersSource<'a> {
        DropiOrdersSource {
            client: self,
            token,
            since,
        }
    }

    pub fn wallet_source<'a>(
        &'a self,
        token: &'a str,
        since: Option<DateTime<Utc>>,
    ) -> DropiWalletSource<'a> {
        DropiWalletSource {
            client: self,
            token,
            since,
        }
    }

    async fn get_items(
        &self,
        path: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Value>, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status.as_u16(), body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(format!("{}: {}", path, e)))?;

        extract_items(body)
    }
}

/// Dropi wraps list payloads inconsistently: `objects`, `data`, or a bare
/// array depending on the endpoint version.
fn extract_items(body: Value) -> Result<Vec<Value>, FetchError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in ["objects", "data"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Ok(items);
                }
            }
            Err(FetchError::Decode(
                "list response carries no objects/data array".to_string(),
            ))
        }
        other => Err(FetchError::Decode(format!(
            "unexpected list payload: {}",
            other
        ))),
    }
}

pub struct DropiOrdersSource<'a> {
    client: &'a DropiClient,
    token: &'a str,
    since: Option<DateTime<Utc>>,
}

#[async_trait]
impl PageSource for DropiOrdersSource<'_> {
    type Item = Value;

    async fn fetch_page(&self, offset: u32, limit: u32) -> Result<Vec<Value>, FetchError> {
        self.client
            .list_orders(self.token, self.since, offset, limit)
            .await
    }
}

pub struct DropiWalletSource<'a> {
    client: &'a DropiClient,
    token: &'a str,
    since: Option<DateTime<Utc>>,
}

#[async_trait]
impl PageSource for DropiWalletSource<'_> {
    type Item = Value;

    async fn fetch_page(&self, offset: u32, limit: u32) -> Result<Vec<Value>, FetchError> {
        self.client
            .list_wallet_movements(self.token, self.since, offset, limit)
            .await
    }
}

/// The `status` field arrives as a plain string on some endpoints and as a
/// nested object on others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StatusField {
    Plain(String),
    Nested { name: String },
}

impl StatusField {
    pub fn as_str(&self) -> &str {
        match self {
            StatusField::Plain(s) => s,
            StatusField::Nested { name } => name,
        }
    }
}

/// Typed view of one order item; unknown fields stay in the raw payload.
#[derive(Debug, Clone, Deserialize)]
pub struct DropiOrder {
    pub id: i64,
    pub status: Option<StatusField>,
    #[serde(alias = "total_order")]
    pub total: Option<Value>,
    #[serde(alias = "shipping_amount")]
    pub shipping_cost: Option<Value>,
    #[serde(alias = "dropshipper_profit", alias = "utility")]
    pub profit: Option<Value>,
    #[serde(alias = "client_name")]
    pub customer_name: Option<String>,
    #[serde(alias = "client_phone", alias = "phone")]
    pub customer_phone: Option<String>,
    #[serde(alias = "shipping_city")]
    pub city: Option<String>,
    #[serde(alias = "state")]
    pub department: Option<String>,
    #[serde(alias = "dir")]
    pub address: Option<String>,
    #[serde(alias = "shipping_company")]
    pub courier: Option<Value>,
    #[serde(alias = "created_date")]
    pub created_at: Option<String>,
    #[serde(alias = "updated_date")]
    pub updated_at: Option<String>,
    #[serde(alias = "delivered_date")]
    pub delivered_at: Option<String>,
    #[serde(alias = "returned_date")]
    pub returned_at: Option<String>,
}

impl DropiOrder {
    pub fn parse(value: &Value) -> Result<DropiOrder, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// Typed view of one wallet ledger item.
#[derive(Debug, Clone, Deserialize)]
pub struct DropiMovement {
    pub id: i64,
    #[serde(rename = "type", alias = "direction")]
    pub movement_type: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Value>,
    #[serde(alias = "balance")]
    pub balance_after: Option<Value>,
    #[serde(alias = "order_id", alias = "order")]
    pub order_reference: Option<Value>,
    #[serde(alias = "created_date", alias = "date")]
    pub created_at: Option<String>,
}

impl DropiMovement {
    pub fn parse(value: &Value) -> Result<DropiMovement, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// Pull a string out of a field that may be plain text or an object with a
/// `name` (couriers, agencies).
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        _ => None,
    }
}

/// Pull a numeric id out of a field that may be a number or a numeric
/// string.
pub fn id_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().trim_start_matches('#').parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_field_plain_or_nested() {
        let plain: StatusField = serde_json::from_value(serde_json::json!("ENTREGADO")).unwrap();
        assert_eq!(plain.as_str(), "ENTREGADO");

        let nested: StatusField =
            serde_json::from_value(serde_json::json!({"name": "EN RUTA", "id": 4})).unwrap();
        assert_eq!(nested.as_str(), "EN RUTA");
    }

    #[test]
    fn test_order_parse_with_nested_status() {
        let value = serde_json::json!({
            "id": 4821,
            "status": {"name": "ENTREGADO", "id": 7},
            "total_order": "89.900",
            "client_name": "Ana Pérez",
            "shipping_company": {"name": "Interrapidisimo"},
            "created_date": "2024-05-01 13:22:10"
        });
        let order = DropiOrder::parse(&value).unwrap();
        assert_eq!(order.id, 4821);
        assert_eq!(order.status.unwrap().as_str(), "ENTREGADO");
        assert_eq!(text_of(order.courier.as_ref().unwrap()).unwrap(), "Interrapidisimo");
    }

    #[test]
    fn test_order_without_id_fails_parse() {
        let value = serde_json::json!({"status": "ENTREGADO"});
        assert!(DropiOrder::parse(&value).is_err());
    }

    #[test]
    fn test_movement_order_reference_shapes() {
        let m = DropiMovement::parse(&serde_json::json!({
            "id": 99, "type": "ENTRADA", "order_id": "4821", "amount": 52000
        }))
        .unwrap();
        assert_eq!(id_of(m.order_reference.as_ref().unwrap()), Some(4821));

        let m = DropiMovement::parse(&serde_json::json!({
            "id": 100, "type": "SALIDA", "order_id": 4822, "amount": "9.500"
        }))
        .unwrap();
        assert_eq!(id_of(m.order_reference.as_ref().unwrap()), Some(4822));
    }

    #[test]
    fn test_extract_items_shapes() {
        let objects = serde_json::json!({"objects": [{"id": 1}], "count": 1});
        assert_eq!(extract_items(objects).unwrap().len(), 1);

        let data = serde_json::json!({"data": [{"id": 1}, {"id": 2}]});
        assert_eq!(extract_items(data).unwrap().len(), 2);

        let bare = serde_json::json!([{"id": 1}]);
        assert_eq!(extract_items(bare).unwrap().len(), 1);

        assert!(extract_items(serde_json::json!({"count": 0})).is_err());
    }
}
