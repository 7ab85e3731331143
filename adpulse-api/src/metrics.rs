use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Json,
};
use bigdecimal::{BigDecimal, Zero};
use chrono::{Duration, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing;

use adpulse_core::schema::{crm_contacts, dropi_orders};
use adpulse_core::{AppContext, OrderStatus};
use adpulse_connectors::meta::{AdInsight, MetaClient};

use crate::auth::AuthenticatedUser;

#[derive(Deserialize)]
pub struct AdMetricsQuery {
    #[serde(default)]
    pub since: Option<NaiveDate>,
    #[serde(default)]
    pub until: Option<NaiveDate>,
}

/// One ad's profitability line: spend side from Meta, result side from the
/// cached CRM contacts.
#[derive(Debug, Serialize)]
pub struct AdMetricsRow {
    pub ad_id: String,
    pub ad_name: Option<String>,
    pub spend: BigDecimal,
    pub impressions: i64,
    pub clicks: i64,
    pub leads: i64,
    pub sales: i64,
    pub revenue: BigDecimal,
    pub cpa: Option<BigDecimal>,
    pub roas: Option<BigDecimal>,
}

#[derive(Debug, Default, Clone)]
struct ContactAgg {
    leads: i64,
    sales: i64,
    revenue: BigDecimal,
}

/// Per-ad CPA/ROAS for a date range (defaults to the last 30 days).
/// A missing or failing Meta side degrades to spendless rows rather than
/// an error, so the CRM side is always served.
pub async fn ad_metrics(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<AdMetricsQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let until = params.until.unwrap_or_else(|| Utc::now().date_naive());
    let since = params.since.unwrap_or(until - Duration::days(30));

    let insights = match MetaClient::new(&ctx.config.meta) {
        Ok(client) => match client.ad_insights(since, until).await {
            Ok(insights) => insights,
            Err(e) => {
                tracing::warn!("Meta insights unavailable: {}", e);
                Vec::new()
            }
        },
        Err(e) => {
            tracing::warn!("Meta client unavailable: {}", e);
            Vec::new()
        }
    };

    let mut conn = match ctx.db_pool.get().await {
        Ok(c) => c,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let range_start = since
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let range_end = (until + Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or(StatusCode::BAD_REQUEST)?;

    let contacts: Vec<(Option<String>, Option<BigDecimal>)> = match crm_contacts::table
        .filter(crm_contacts::user_id.eq(user.user_id))
        .filter(crm_contacts::ad_id.is_not_null())
        .filter(crm_contacts::source_created_at.ge(range_start))
        .filter(crm_contacts::source_created_at.lt(range_end))
        .select((crm_contacts::ad_id, crm_contacts::amount_paid))
        .load(&mut conn)
        .await
    {
        Ok(rows) => rows,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let mut by_ad: HashMap<String, ContactAgg> = HashMap::new();
    for (ad_id, amount_paid) in contacts {
        let Some(ad_id) = ad_id else { continue };
        let agg = by_ad.entry(ad_id).or_default();
        match amount_paid.filter(|a| a > &BigDecimal::zero()) {
            Some(amount) => {
                agg.sales += 1;
                agg.revenue += amount;
            }
            None => agg.leads += 1,
        }
    }

    let rows = build_rows(insights, by_ad);

    Ok(Json(serde_json::json!({
        "since": since,
        "until": until,
        "ads": rows,
    })))
}

/// Join the spend side with the contact side over the union of ad ids.
fn build_rows(insights: Vec<AdInsight>, mut by_ad: HashMap<String, ContactAgg>) -> Vec<AdMetricsRow> {
    let mut rows: Vec<AdMetricsRow> = Vec::with_capacity(insights.len() + by_ad.len());

    for insight in insights {
        let agg = by_ad.remove(&insight.ad_id).unwrap_or_default();
        rows.push(make_row(
            insight.ad_id,
            insight.ad_name,
            insight.spend,
            insight.impressions,
            insight.clicks,
            agg,
        ));
    }

    // Ads seen in the CRM but absent from the insights range still get a row
    for (ad_id, agg) in by_ad {
        rows.push(make_row(ad_id, None, BigDecimal::zero(), 0, 0, agg));
    }

    rows.sort_by(|a, b| a.ad_id.cmp(&b.ad_id));
    rows
}

fn make_row(
    ad_id: String,
    ad_name: Option<String>,
    spend: BigDecimal,
    impressions: i64,
    clicks: i64,
    agg: ContactAgg,
) -> AdMetricsRow {
    // Zero denominators report as null, never as an error
    let cpa = if agg.sales > 0 {
        Some((&spend / BigDecimal::from(agg.sales)).with_scale(2))
    } else {
        None
    };
    let roas = if spend > BigDecimal::zero() {
        Some((&agg.revenue / &spend).with_scale(2))
    } else {
        None
    };

    AdMetricsRow {
        ad_id,
        ad_name,
        spend,
        impressions,
        clicks,
        leads: agg.leads,
        sales: agg.sales,
        revenue: agg.revenue,
        cpa,
        roas,
    }
}

/// Totals over the cached order book.
#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub total_orders: i64,
    pub by_status: BTreeMap<String, i64>,
    pub delivered_revenue: BigDecimal,
    pub delivered_profit: BigDecimal,
    pub paid_orders: i64,
    pub paid_total: BigDecimal,
    pub charged_orders: i64,
    pub charged_total: BigDecimal,
}

type SummaryRow = (
    String,
    BigDecimal,
    Option<BigDecimal>,
    bool,
    Option<BigDecimal>,
    bool,
    Option<BigDecimal>,
);

pub async fn summary_metrics(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<OrderSummary>, StatusCode> {
    let mut conn = match ctx.db_pool.get().await {
        Ok(c) => c,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let rows: Vec<SummaryRow> = match dropi_orders::table
        .filter(dropi_orders::user_id.eq(user.user_id))
        .select((
            dropi_orders::status,
            dropi_orders::order_total,
            dropi_orders::profit,
            dropi_orders::is_paid,
            dropi_orders::paid_amount,
            dropi_orders::is_return_charged,
            dropi_orders::charged_amount,
        ))
        .load(&mut conn)
        .await
    {
        Ok(rows) => rows,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    Ok(Json(summarize(rows)))
}

fn summarize(rows: Vec<SummaryRow>) -> OrderSummary {
    let mut summary = OrderSummary {
        total_orders: rows.len() as i64,
        by_status: BTreeMap::new(),
        delivered_revenue: BigDecimal::zero(),
        delivered_profit: BigDecimal::zero(),
        paid_orders: 0,
        paid_total: BigDecimal::zero(),
        charged_orders: 0,
        charged_total: BigDecimal::zero(),
    };

    for (status, total, profit, is_paid, paid_amount, is_charged, charged_amount) in rows {
        *summary.by_status.entry(status.clone()).or_insert(0) += 1;

        if status == OrderStatus::Entregado.as_str() {
            summary.delivered_revenue += total;
            if let Some(profit) = profit {
                summary.delivered_profit += profit;
            }
        }
        if is_paid {
            summary.paid_orders += 1;
            if let Some(amount) = paid_amount {
                summary.paid_total += amount;
            }
        }
        if is_charged {
            summary.charged_orders += 1;
            if let Some(amount) = charged_amount {
                summary.charged_total += amount;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_cpa_and_roas() {
        let mut by_ad = HashMap::new();
        by_ad.insert(
            "ad-1".to_string(),
            ContactAgg {
                leads: 10,
                sales: 4,
                revenue: dec("360000"),
            },
        );
        let insights = vec![AdInsight {
            ad_id: "ad-1".to_string(),
            ad_name: Some("Video 3".to_string()),
            spend: dec("120000"),
            impressions: 5000,
            clicks: 200,
        }];

        let rows = build_rows(insights, by_ad);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cpa, Some(dec("30000.00")));
        assert_eq!(rows[0].roas, Some(dec("3.00")));
    }

    #[test]
    fn test_zero_sales_cpa_is_null() {
        let mut by_ad = HashMap::new();
        by_ad.insert(
            "ad-1".to_string(),
            ContactAgg {
                leads: 8,
                sales: 0,
                revenue: BigDecimal::zero(),
            },
        );
        let insights = vec![AdInsight {
            ad_id: "ad-1".to_string(),
            ad_name: None,
            spend: dec("50000"),
            impressions: 1000,
            clicks: 40,
        }];

        let rows = build_rows(insights, by_ad);
        assert_eq!(rows[0].cpa, None);
        assert_eq!(rows[0].roas, Some(dec("0.00")));
    }

    #[test]
    fn test_zero_spend_roas_is_null() {
        let mut by_ad = HashMap::new();
        by_ad.insert(
            "ad-2".to_string(),
            ContactAgg {
                leads: 1,
                sales: 2,
                revenue: dec("100000"),
            },
        );

        let rows = build_rows(Vec::new(), by_ad);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ad_id, "ad-2");
        assert_eq!(rows[0].roas, None);
        assert_eq!(rows[0].cpa, Some(dec("0.00")));
    }

    #[test]
    fn test_insight_without_contacts_keeps_row() {
        let insights = vec![AdInsight {
            ad_id: "ad-3".to_string(),
            ad_name: None,
            spend: dec("10"),
            impressions: 100,
            clicks: 3,
        }];
        let rows = build_rows(insights, HashMap::new());
        assert_eq!(rows[0].leads, 0);
        assert_eq!(rows[0].sales, 0);
        assert_eq!(rows[0].cpa, None);
    }

    #[test]
    fn test_summary_totals() {
        let rows: Vec<SummaryRow> = vec![
            (
                "ENTREGADO".to_string(),
                dec("89900"),
                Some(dec("32000")),
                true,
                Some(dec("32000")),
                false,
                None,
            ),
            (
                "ENTREGADO".to_string(),
                dec("45000"),
                None,
                false,
                None,
                false,
                None,
            ),
            (
                "DEVOLUCION".to_string(),
                dec("60000"),
                Some(dec("20000")),
                false,
                None,
                true,
                Some(dec("9500")),
            ),
        ];

        let summary = summarize(rows);
        assert_eq!(summary.total_orders, 3);
        assert_eq!(summary.by_status["ENTREGADO"], 2);
        assert_eq!(summary.by_status["DEVOLUCION"], 1);
        assert_eq!(summary.delivered_revenue, dec("134900"));
        assert_eq!(summary.delivered_profit, dec("32000"));
        assert_eq!(summary.paid_orders, 1);
        assert_eq!(summary.paid_total, dec("32000"));
        assert_eq!(summary.charged_orders, 1);
        assert_eq!(summary.charged_total, dec("9500"));
    }
}
