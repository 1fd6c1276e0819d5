//! Boundary to the external commerce platform: order lookup, refunds, and
//! draft orders for exchanges. The rest of the service talks to the
//! [`OrderGateway`] trait so admin decisions can be tested against doubles.

pub mod client;

pub use client::{ShopifyClient, ShopifyConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure talking to the commerce platform. `Api` carries the upstream
/// payload verbatim for admin-facing diagnosis; `Request` covers transport
/// failures and timeouts, which are safe to retry.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Could not communicate with the commerce platform: {0}")]
    Request(String),

    #[error("Commerce platform error (status {status}): {payload}")]
    Api { status: u16, payload: String },
}

impl GatewayError {
    /// The platform refuses to refund items that were already refunded. This
    /// signal means a previous approval reached the platform even if the
    /// local status write was lost, so callers treat it as already processed.
    pub fn is_already_refunded(&self) -> bool {
        matches!(
            self,
            GatewayError::Api { payload, .. }
                if payload.to_lowercase().contains("cannot refund more items")
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Request(err.to_string())
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// Display name, e.g. `#1001`.
    pub name: String,
    pub email: Option<String>,
    pub currency: String,
    pub created_at: Option<DateTime<Utc>>,
    pub customer: Option<Customer>,
    pub shipping_address: Option<serde_json::Value>,
    #[serde(default)]
    pub line_items: Vec<OrderLineItem>,
    #[serde(default)]
    pub images: Vec<ProductImage>,
}

/// Customer record attached to an order. Only the id is consumed by the
/// lifecycle engine; everything else passes through to the lookup response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Option<i64>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: i64,
    pub title: String,
    pub quantity: i32,
    pub price: String,
    pub variant_id: Option<i64>,
    pub product_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductImage {
    pub src: String,
    #[serde(default)]
    pub variant_ids: Vec<i64>,
}

/// One entry of a refund request, platform naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundLineItem {
    pub line_item_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftOrder {
    pub id: i64,
    pub name: Option<String>,
}

// ── Gateway contract ──────────────────────────────────────────────────────────

#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Look up an order by display number and customer email. The number is
    /// normalized to the `#`-prefixed form and the email compared
    /// case-insensitively. Scans the platform's most recent orders (one page,
    /// 250) — orders older than that window are reported as a miss.
    async fn find_order(
        &self,
        order_number: &str,
        email: &str,
    ) -> Result<Option<Order>, GatewayError>;

    /// Create a refund covering `line_items`. Notifies the customer by email
    /// as a platform side effect, so this must be called at most once per
    /// approval.
    async fn create_refund(
        &self,
        order_id: i64,
        line_items: &[RefundLineItem],
        currency: &str,
    ) -> Result<Refund, GatewayError>;

    /// Create a draft order holding the replacement item, free of charge,
    /// attached to the given platform customer.
    async fn create_draft_order(
        &self,
        customer_id: i64,
        variant_id: i64,
        original_order_number: &str,
    ) -> Result<DraftOrder, GatewayError>;
}
