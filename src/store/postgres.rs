use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::RequestStore;
use crate::error::{AppError, AppResult};
use crate::models::{NewReturnRequest, RequestFilters, RequestStatus, ReturnRequest};

const COLUMNS: &str = "id, shopify_order_id, shopify_order_number, customer_email, line_items, \
     request_type, exchange_for_variant_id, refund_mode, image_url, status, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestStore for PgStore {
    async fn insert(&self, new: NewReturnRequest) -> AppResult<ReturnRequest> {
        let request = sqlx::query_as::<_, ReturnRequest>(&format!(
            r#"
            INSERT INTO return_requests
                (shopify_order_id, shopify_order_number, customer_email, line_items,
                 request_type, exchange_for_variant_id, refund_mode, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(new.shopify_order_id)
        .bind(&new.shopify_order_number)
        .bind(&new.customer_email)
        .bind(Json(&new.line_items))
        .bind(new.request_type)
        .bind(new.exchange_for_variant_id)
        .bind(&new.refund_mode)
        .bind(new.image_url.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(request)
    }

    async fn get(&self, id: Uuid) -> AppResult<ReturnRequest> {
        sqlx::query_as::<_, ReturnRequest>(&format!(
            "SELECT {COLUMNS} FROM return_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Return request {} not found", id)))
    }

    async fn list(&self, filters: &RequestFilters) -> AppResult<Vec<ReturnRequest>> {
        let status = filters.status_filter()?;
        let (start, end): (Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
            match filters.date_range {
                Some(range) => {
                    // Windows are anchored at local midnight of "now".
                    let (start, end) = range.window(Local::now());
                    (
                        Some(start.with_timezone(&Utc)),
                        end.map(|e| e.with_timezone(&Utc)),
                    )
                }
                None => (None, None),
            };

        let requests = sqlx::query_as::<_, ReturnRequest>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM return_requests
            WHERE ($1::request_status IS NULL OR status = $1)
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            ORDER BY created_at DESC
            "#
        ))
        .bind(status)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
    ) -> AppResult<ReturnRequest> {
        let updated = sqlx::query_as::<_, ReturnRequest>(&format!(
            r#"
            UPDATE return_requests
            SET status = $3, updated_at = now()
            WHERE id = $1 AND status = $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(request) => Ok(request),
            // Zero rows: either the request is gone, or another writer got
            // there first. `get` distinguishes the two.
            None => {
                self.get(id).await?;
                Err(AppError::AlreadyProcessed)
            }
        }
    }
}
