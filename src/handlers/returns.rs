//! Customer-facing surface: order lookup and request submission.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{
    error::{AppError, AppResult},
    models::{LineItem, NewReturnRequest, OrderLookup, RequestType},
    AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupPayload {
    pub order_number: Option<String>,
    pub email: Option<String>,
}

pub async fn lookup_order(
    State(state): State<AppState>,
    Json(payload): Json<LookupPayload>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let order_number = payload
        .order_number
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Order Number and Email are required.".to_string()))?;
    let email = payload
        .email
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Order Number and Email are required.".to_string()))?;

    let order = state
        .gateway
        .find_order(&order_number, &email)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(
                "Order not found. Please check your details and try again.".to_string(),
            )
        })?;

    info!(order_number = %order.name, "Order lookup succeeded");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "success": true, "data": OrderLookup::from(order) })),
    ))
}

/// Accepts the storefront's multipart submission: text fields plus an
/// optional `image` evidence attachment.
pub async fn create_return_request(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let mut order_id: Option<i64> = None;
    let mut order_number: Option<String> = None;
    let mut email: Option<String> = None;
    let mut line_items: Vec<LineItem> = Vec::new();
    let mut request_type = RequestType::Return;
    let mut exchange_for_variant_id: Option<i64> = None;
    let mut refund_mode = "Not specified".to_string();
    let mut image_url: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::Validation(err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "orderId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::Validation(err.to_string()))?;
                order_id = Some(text.trim().parse().map_err(|_| {
                    AppError::Validation("orderId must be a numeric platform id.".to_string())
                })?);
            }
            "orderNumber" => {
                order_number = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| AppError::Validation(err.to_string()))?,
                );
            }
            "email" => {
                email = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| AppError::Validation(err.to_string()))?,
                );
            }
            // The storefront sends the selected items as one JSON-encoded field.
            "items" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::Validation(err.to_string()))?;
                line_items = serde_json::from_str(&text).map_err(|err| {
                    AppError::Validation(format!("items is not a valid item list: {err}"))
                })?;
            }
            "requestType" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::Validation(err.to_string()))?;
                request_type = match text.trim() {
                    "" | "return" => RequestType::Return,
                    "exchange" => RequestType::Exchange,
                    other => {
                        return Err(AppError::Validation(format!(
                            "Unknown request type '{other}'."
                        )))
                    }
                };
            }
            "exchangeForVariantId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::Validation(err.to_string()))?;
                if !text.trim().is_empty() {
                    exchange_for_variant_id = Some(text.trim().parse().map_err(|_| {
                        AppError::Validation(
                            "exchangeForVariantId must be a numeric variant id.".to_string(),
                        )
                    })?);
                }
            }
            "refundMode" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::Validation(err.to_string()))?;
                if !text.trim().is_empty() {
                    refund_mode = text;
                }
            }
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::Validation(err.to_string()))?;
                image_url = Some(
                    state
                        .uploads
                        .save_image(&file_name, &content_type, &bytes)
                        .await?,
                );
            }
            _ => {}
        }
    }

    let new = NewReturnRequest {
        shopify_order_id: order_id
            .ok_or_else(|| AppError::Validation("Order ID and items are required.".to_string()))?,
        shopify_order_number: order_number
            .ok_or_else(|| AppError::Validation("Order number is required.".to_string()))?,
        customer_email: email
            .ok_or_else(|| AppError::Validation("Email is required.".to_string()))?,
        line_items,
        request_type,
        exchange_for_variant_id,
        refund_mode,
        image_url,
    };
    new.validate()?;

    let request = state.store.insert(new).await?;

    info!(
        id = %request.id,
        order_number = %request.shopify_order_number,
        request_type = ?request.request_type,
        items = request.line_items.len(),
        "Created return request"
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "Request created successfully.",
            "data": request,
        })),
    ))
}
