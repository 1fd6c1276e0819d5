use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::shopify::{Customer, Order};

/// Shown when no image mapping exists for an item's variant.
pub const PLACEHOLDER_IMAGE: &str = "https://placehold.co/100x100/eee/ccc?text=No+Image";

/// Customer-facing view of a platform order, as returned by the lookup
/// endpoint. Field names match the storefront contract (camelCase).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLookup {
    pub order_id: i64,
    pub order_number: String,
    pub created_at: Option<DateTime<Utc>>,
    pub customer: Option<Customer>,
    pub shipping_address: Option<serde_json::Value>,
    pub email: Option<String>,
    pub line_items: Vec<LookupLineItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupLineItem {
    pub id: i64,
    pub title: String,
    pub quantity: i32,
    pub price: String,
    pub variant_id: Option<i64>,
    pub product_id: Option<i64>,
    /// Best-effort product image for this item's variant.
    pub image: String,
}

impl From<Order> for OrderLookup {
    fn from(order: Order) -> Self {
        let mut variant_images: HashMap<i64, String> = HashMap::new();
        for image in &order.images {
            for variant_id in &image.variant_ids {
                variant_images.insert(*variant_id, image.src.clone());
            }
        }

        let line_items = order
            .line_items
            .into_iter()
            .map(|item| {
                let image = item
                    .variant_id
                    .and_then(|id| variant_images.get(&id).cloned())
                    .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());
                LookupLineItem {
                    id: item.id,
                    title: item.title,
                    quantity: item.quantity,
                    price: item.price,
                    variant_id: item.variant_id,
                    product_id: item.product_id,
                    image,
                }
            })
            .collect();

        Self {
            order_id: order.id,
            order_number: order.name,
            created_at: order.created_at,
            customer: order.customer,
            shipping_address: order.shipping_address,
            email: order.email,
            line_items,
        }
    }
}
