use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{DraftOrder, GatewayError, Order, OrderGateway, Refund, RefundLineItem};

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";
const API_VERSION: &str = "2025-07";

/// One page of the orders listing — the lookup scan never goes deeper, so
/// orders older than the most recent 250 are reported as not found.
const RECENT_ORDER_LIMIT: u32 = 250;

/// Connection settings for the commerce platform, injected at construction
/// so environments and test doubles never share mutable global state.
#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    /// Shop host, e.g. `my-store.myshopify.com`.
    pub shop_url: String,
    pub access_token: String,
    /// Upper bound on any single platform call; expiry surfaces as a
    /// retryable [`GatewayError::Request`].
    pub timeout: Duration,
}

pub struct ShopifyClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrdersEnvelope {
    orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
struct RefundEnvelope {
    refund: Refund,
}

#[derive(Debug, Deserialize)]
struct DraftOrderEnvelope {
    draft_order: DraftOrder,
}

impl ShopifyClient {
    pub fn new(config: &ShopifyConfig) -> anyhow::Result<Self> {
        Self::with_base_url(
            format!("https://{}/admin/api/{}", config.shop_url, API_VERSION),
            config.access_token.clone(),
            config.timeout,
        )
    }

    /// Construct against an explicit base URL. Tests point this at an
    /// in-process server.
    pub fn with_base_url(
        base_url: String,
        access_token: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            access_token,
        })
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let payload = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                payload,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| GatewayError::Request(format!("invalid platform response: {err}")))
    }
}

#[async_trait]
impl OrderGateway for ShopifyClient {
    async fn find_order(
        &self,
        order_number: &str,
        email: &str,
    ) -> Result<Option<Order>, GatewayError> {
        let formatted = if order_number.starts_with('#') {
            order_number.to_string()
        } else {
            format!("#{order_number}")
        };

        let url = format!(
            "{}/orders.json?status=any&limit={}",
            self.base_url, RECENT_ORDER_LIMIT
        );
        let response = self
            .http
            .get(&url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .send()
            .await?;
        let envelope: OrdersEnvelope = Self::parse(response).await?;

        Ok(envelope.orders.into_iter().find(|order| {
            order.name == formatted
                && order
                    .email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
        }))
    }

    async fn create_refund(
        &self,
        order_id: i64,
        line_items: &[RefundLineItem],
        currency: &str,
    ) -> Result<Refund, GatewayError> {
        let payload = serde_json::json!({
            "refund": {
                "currency": currency,
                // The platform emails the customer about the refund.
                "notify": true,
                "refund_line_items": line_items,
            }
        });

        let url = format!("{}/orders/{}/refunds.json", self.base_url, order_id);
        let response = self
            .http
            .post(&url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&payload)
            .send()
            .await?;
        let envelope: RefundEnvelope = Self::parse(response).await?;
        Ok(envelope.refund)
    }

    async fn create_draft_order(
        &self,
        customer_id: i64,
        variant_id: i64,
        original_order_number: &str,
    ) -> Result<DraftOrder, GatewayError> {
        let payload = serde_json::json!({
            "draft_order": {
                "line_items": [{
                    "variant_id": variant_id,
                    "quantity": 1,
                    // 100% off makes the replacement item free.
                    "applied_discount": {
                        "title": "Exchange Item",
                        "description": format!("Even exchange for item from order {original_order_number}"),
                        "value": "100",
                        "value_type": "percentage",
                    }
                }],
                "customer": { "id": customer_id },
                "note": format!("Automated exchange for a return from order {original_order_number}."),
                "use_customer_default_address": true,
            }
        });

        let url = format!("{}/draft_orders.json", self.base_url);
        let response = self
            .http
            .post(&url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&payload)
            .send()
            .await?;
        let envelope: DraftOrderEnvelope = Self::parse(response).await?;
        Ok(envelope.draft_order)
    }
}
