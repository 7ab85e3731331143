use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use adpulse_core::config::LucidbotConfig;
use adpulse_core::money::parse_money_value;

use crate::error::FetchError;
use crate::paginate::PageSource;

/// LucidBot serves at most 100 contacts per call.
pub const CONTACT_PAGE_SIZE: u32 = 100;

const CONTACTS_PATH: &str = "/contacts";

/// HTTP client for the LucidBot CRM. The API key is the per-user
/// connection credential.
pub struct LucidbotClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub ad_id: Option<String>,
    pub updated_since: Option<DateTime<Utc>>,
}

impl LucidbotClient {
    pub fn new(config: &LucidbotConfig, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// One page of the contact listing, raw JSON items for the sink.
    pub async fn list_contacts(
        &self,
        filter: &ContactFilter,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Value>, FetchError> {
        let url = format!("{}{}", self.base_url, CONTACTS_PATH);
        let mut query: Vec<(&str, String)> = vec![
            ("limit", limit.min(CONTACT_PAGE_SIZE).to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(ad_id) = &filter.ad_id {
            query.push(("custom_field[ad_id]", ad_id.clone()));
        }
        if let Some(since) = filter.updated_since {
            query.push(("updated_since", since.to_rfc3339()));
        }

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status.as_u16(), body));
        }

        #[derive(Deserialize)]
        struct ContactsResponse {
            #[serde(alias = "contacts")]
            data: Vec<Value>,
        }

        let body: ContactsResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(format!("contacts response: {}", e)))?;

        Ok(body.data)
    }

    pub fn contacts_source<'a>(&'a self, filter: ContactFilter) -> LucidContactsSource<'a> {
        LucidContactsSource {
            client: self,
            filter,
        }
    }
}

pub struct LucidContactsSource<'a> {
    client: &'a LucidbotClient,
    filter: ContactFilter,
}

#[async_trait]
impl PageSource for LucidContactsSource<'_> {
    type Item = Value;

    async fn fetch_page(&self, offset: u32, limit: u32) -> Result<Vec<Value>, FetchError> {
        self.client.list_contacts(&self.filter, offset, limit).await
    }
}

/// Typed view of one CRM contact.
#[derive(Debug, Clone, Deserialize)]
pub struct LucidContact {
    pub id: Value,
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(alias = "createdAt", alias = "created_date")]
    pub created_at: Option<String>,
    #[serde(default, alias = "customFields")]
    pub custom_fields: Map<String, Value>,
}

impl LucidContact {
    pub fn parse(value: &Value) -> Result<LucidContact, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    /// Contact ids arrive as numbers or strings depending on the channel.
    pub fn external_id(&self) -> Option<String> {
        match &self.id {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn kind(&self) -> ContactKind {
        ContactKind::classify(&self.custom_fields)
    }

    pub fn ad_id(&self) -> Option<String> {
        field_text(&self.custom_fields, &["ad_id", "adid", "ad", "anuncio", "id_anuncio"])
    }

    pub fn product(&self) -> Option<String> {
        field_containing(&self.custom_fields, "producto")
            .or_else(|| field_containing(&self.custom_fields, "product"))
    }

    pub fn qualification(&self) -> Option<String> {
        field_containing(&self.custom_fields, "calificacion")
            .or_else(|| field_containing(&self.custom_fields, "cualificacion"))
    }
}

/// Lead/sale classification, made explicit at the parse boundary: a
/// positive "total to pay" custom field is a sale, everything else a lead.
#[derive(Debug, Clone, PartialEq)]
pub enum ContactKind {
    Lead,
    Sale { amount: BigDecimal },
}

impl ContactKind {
    pub fn classify(custom_fields: &Map<String, Value>) -> ContactKind {
        for (key, value) in custom_fields {
            let folded = fold_key(key);
            if folded.contains("total") && folded.contains("pagar") {
                if let Some(amount) = parse_money_value(value) {
                    if amount > BigDecimal::zero() {
                        return ContactKind::Sale { amount };
                    }
                }
            }
        }
        ContactKind::Lead
    }

    pub fn sale_amount(&self) -> Option<&BigDecimal> {
        match self {
            ContactKind::Sale { amount } => Some(amount),
            ContactKind::Lead => None,
        }
    }
}

fn fold_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            'á' | 'Á' => 'a',
            'é' | 'É' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'Ó' => 'o',
            'ú' | 'Ú' => 'u',
            'ñ' | 'Ñ' => 'n',
            '_' | '-' => ' ',
            _ => c.to_ascii_lowercase(),
        })
        .collect()
}

fn field_text(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        for (k, v) in fields {
            if fold_key(k).replace(' ', "") == *key {
                if let Some(s) = v.as_str() {
                    if !s.trim().is_empty() {
                        return Some(s.trim().to_string());
                    }
                } else if let Some(n) = v.as_i64() {
                    return Some(n.to_string());
                }
            }
        }
    }
    None
}

fn field_containing(fields: &Map<String, Value>, needle: &str) -> Option<String> {
    fields.iter().find_map(|(k, v)| {
        if fold_key(k).contains(needle) {
            v.as_str()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn fields(json: Value) -> Map<String, Value> {
        json.as_object().unwrap().clone()
    }

    #[test]
    fn test_positive_total_is_sale() {
        let kind = ContactKind::classify(&fields(serde_json::json!({
            "Total a Pagar": "1.234.567",
            "Producto": "Faja reductora"
        })));
        assert_eq!(
            kind,
            ContactKind::Sale {
                amount: BigDecimal::from_str("1234567").unwrap()
            }
        );
    }

    #[test]
    fn test_missing_total_is_lead() {
        let kind = ContactKind::classify(&fields(serde_json::json!({
            "Producto": "Faja reductora"
        })));
        assert_eq!(kind, ContactKind::Lead);
    }

    #[test]
    fn test_zero_or_malformed_total_is_lead() {
        assert_eq!(
            ContactKind::classify(&fields(serde_json::json!({"total_a_pagar": "0"}))),
            ContactKind::Lead
        );
        assert_eq!(
            ContactKind::classify(&fields(serde_json::json!({"total_a_pagar": "N/A"}))),
            ContactKind::Lead
        );
    }

    #[test]
    fn test_contact_parse_and_fields() {
        let value = serde_json::json!({
            "id": 88123,
            "name": "Carlos",
            "phone": "+573001112233",
            "created_at": "2024-05-02T09:00:00Z",
            "custom_fields": {
                "ad_id": "120210998877",
                "Total a Pagar": "89.900",
                "Producto": "Faja reductora",
                "Calificación": "interesado"
            }
        });
        let contact = LucidContact::parse(&value).unwrap();
        assert_eq!(contact.external_id().unwrap(), "88123");
        assert_eq!(contact.ad_id().unwrap(), "120210998877");
        assert_eq!(contact.product().unwrap(), "Faja reductora");
        assert_eq!(contact.qualification().unwrap(), "interesado");
        assert_eq!(
            contact.kind(),
            ContactKind::Sale {
                amount: BigDecimal::from_str("89900").unwrap()
            }
        );
    }

    #[test]
    fn test_contact_without_id_is_unkeyed() {
        let contact = LucidContact::parse(&serde_json::json!({"name": "x"})).unwrap_err();
        // id field is required by the typed view
        let _ = contact;

        let contact =
            LucidContact::parse(&serde_json::json!({"id": "", "name": "x"})).unwrap();
        assert!(contact.external_id().is_none());
    }
}
