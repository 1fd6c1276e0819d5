use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Lifecycle states of a return/exchange request. `Requested` is the only
/// non-terminal state; every transition out of it is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Requested,
    Approved,
    Rejected,
    ExchangeProcessed,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        self != RequestStatus::Requested
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "request_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Return,
    Exchange,
}

fn default_reason() -> String {
    "Not specified".to_string()
}

/// One returned item as submitted by the customer. Field names follow the
/// storefront payload (camelCase); prices arrive as strings from the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: i64,
    pub title: String,
    pub quantity: i32,
    pub price: String,
    pub variant_id: Option<i64>,
    pub product_id: Option<i64>,
    #[serde(default = "default_reason")]
    pub reason: String,
}

/// The sole persistent entity. `status` is the only field mutated after
/// creation; requests are never deleted (they are the audit trail).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReturnRequest {
    pub id: Uuid,
    pub shopify_order_id: i64,
    pub shopify_order_number: String,
    pub customer_email: String,
    pub line_items: Json<Vec<LineItem>>,
    pub request_type: RequestType,
    pub exchange_for_variant_id: Option<i64>,
    pub refund_mode: String,
    pub image_url: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fully-parsed customer submission, ready to persist in `requested` state.
#[derive(Debug, Clone)]
pub struct NewReturnRequest {
    pub shopify_order_id: i64,
    pub shopify_order_number: String,
    pub customer_email: String,
    pub line_items: Vec<LineItem>,
    pub request_type: RequestType,
    pub exchange_for_variant_id: Option<i64>,
    pub refund_mode: String,
    pub image_url: Option<String>,
}

impl NewReturnRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.line_items.is_empty() {
            return Err(AppError::Validation(
                "Order ID and items are required.".to_string(),
            ));
        }
        if self.request_type == RequestType::Exchange && self.exchange_for_variant_id.is_none() {
            return Err(AppError::Validation(
                "An exchange request must name the replacement variant.".to_string(),
            ));
        }
        Ok(())
    }
}

// ── Query parameters ──────────────────────────────────────────────────────────

/// Named date ranges for the admin listing, all anchored at local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    Today,
    Yesterday,
    Last7days,
    Last30days,
}

impl DateRange {
    /// `[start, end]` window for this range. `None` as the upper bound means
    /// open-ended at "now"; `yesterday` is the only range with an explicit end.
    pub fn window<Tz: TimeZone>(self, now: DateTime<Tz>) -> (DateTime<Tz>, Option<DateTime<Tz>>) {
        let midnight = now
            .timezone()
            .from_local_datetime(&now.date_naive().and_hms_opt(0, 0, 0).unwrap())
            .earliest()
            // A DST gap exactly at midnight leaves no unambiguous start-of-day.
            .unwrap_or_else(|| now.clone());

        match self {
            DateRange::Today => (midnight, None),
            DateRange::Yesterday => {
                let start = midnight - Duration::days(1);
                let end = start.clone() + Duration::days(1) - Duration::milliseconds(1);
                (start, Some(end))
            }
            DateRange::Last7days => (midnight - Duration::days(6), None),
            DateRange::Last30days => (midnight - Duration::days(29), None),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequestFilters {
    pub status: Option<String>,
    pub date_range: Option<DateRange>,
}

impl RequestFilters {
    /// Resolve the status query parameter. `all`, empty, or absent mean no
    /// filter; anything that is not a known status is a validation error.
    pub fn status_filter(&self) -> AppResult<Option<RequestStatus>> {
        match self.status.as_deref() {
            None | Some("all") | Some("") => Ok(None),
            Some(other) => serde_json::from_value(serde_json::Value::String(other.to_string()))
                .map(Some)
                .map_err(|_| AppError::Validation(format!("Unknown status filter '{other}'."))),
        }
    }
}
