use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde_json::Value;
use std::str::FromStr;
use tracing;

use adpulse_core::config::MetaConfig;

use crate::error::FetchError;

/// Meta paginates insights with cursor links; bound how far we follow them.
const INSIGHTS_MAX_PAGES: u32 = 20;

/// Per-ad spend/impressions/clicks for a date range.
#[derive(Debug, Clone)]
pub struct AdInsight {
    pub ad_id: String,
    pub ad_name: Option<String>,
    pub spend: BigDecimal,
    pub impressions: i64,
    pub clicks: i64,
}

/// Read-only client for the Meta Ads insights API. Unconfigured
/// deployments get empty insights rather than errors, so the metrics
/// endpoints still serve the CRM/fulfillment side.
pub struct MetaClient {
    client: Option<reqwest::Client>,
    base_url: String,
    access_token: Option<String>,
    ad_account_id: Option<String>,
}

impl MetaClient {
    pub fn new(config: &MetaConfig) -> Result<Self> {
        let client = if config.access_token.is_some() && config.ad_account_id.is_some() {
            tracing::info!("Initializing Meta Ads client");
            Some(
                reqwest::Client::builder()
                    .timeout(std::time::Duration::from_secs(30))
                    .build()
                    .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?,
            )
        } else {
            tracing::warn!("Meta Ads disabled (missing access token or ad account id)");
            None
        };

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            ad_account_id: config.ad_account_id.clone(),
        })
    }

    /// Ad-level insights for the date range, following cursor pages.
    pub async fn ad_insights(
        &self,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<AdInsight>, FetchError> {
        let (client, token, account) = match (&self.client, &self.access_token, &self.ad_account_id)
        {
            (Some(c), Some(t), Some(a)) => (c, t, a),
            _ => {
                tracing::debug!("Meta Ads not configured, returning no insights");
                return Ok(Vec::new());
            }
        };

        let mut insights = Vec::new();
        let time_range = format!(r#"{{"since":"{}","until":"{}"}}"#, since, until);
        let mut next_url = Some(format!(
            "{}/act_{}/insights?level=ad&fields=ad_id,ad_name,spend,impressions,clicks&time_range={}&access_token={}",
            self.base_url, account, time_range, token
        ));

        let mut pages = 0u32;
        while let Some(url) = next_url.take() {
            let response = client.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(FetchError::from_status(status.as_u16(), body));
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| FetchError::Decode(format!("insights response: {}", e)))?;

            if let Some(items) = body.get("data").and_then(|d| d.as_array()) {
                insights.extend(items.iter().filter_map(parse_insight));
            }

            pages += 1;
            if pages >= INSIGHTS_MAX_PAGES {
                tracing::warn!("Insights pagination stopped at safety ceiling ({} pages)", pages);
                break;
            }
            next_url = body
                .get("paging")
                .and_then(|p| p.get("next"))
                .and_then(|n| n.as_str())
                .map(|s| s.to_string());
        }

        Ok(insights)
    }
}

/// Meta reports numeric insight fields as strings with a dot decimal.
fn parse_insight(item: &Value) -> Option<AdInsight> {
    let ad_id = item.get("ad_id").and_then(|v| v.as_str())?.to_string();
    let spend = item
        .get("spend")
        .and_then(|v| v.as_str())
        .and_then(|s| BigDecimal::from_str(s).ok())
        .unwrap_or_default();

    Some(AdInsight {
        ad_id,
        ad_name: item
            .get("ad_name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        spend,
        impressions: int_field(item, "impressions"),
        clicks: int_field(item, "clicks"),
    })
}

fn int_field(item: &Value, field: &str) -> i64 {
    match item.get(field) {
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_insight_string_numbers() {
        let insight = parse_insight(&serde_json::json!({
            "ad_id": "120210998877",
            "ad_name": "Faja - Video 3",
            "spend": "152.37",
            "impressions": "10432",
            "clicks": "311"
        }))
        .unwrap();
        assert_eq!(insight.ad_id, "120210998877");
        assert_eq!(insight.spend, BigDecimal::from_str("152.37").unwrap());
        assert_eq!(insight.impressions, 10432);
        assert_eq!(insight.clicks, 311);
    }

    #[test]
    fn test_parse_insight_requires_ad_id() {
        assert!(parse_insight(&serde_json::json!({"spend": "10.0"})).is_none());
    }
}
