//! The request lifecycle state machine: `requested` → `approved` |
//! `exchange_processed` | `rejected`, with every terminal state final.
//!
//! Approval orchestrates the commerce platform. The terminal status is
//! claimed through the store's atomic conditional write *before* the
//! platform mutation, so concurrent approvals produce at most one refund or
//! draft order; if the mutation then fails, the claim is released and the
//! request stays retryable. The platform's "cannot refund more items"
//! payload is the recovery signal for the remaining crash window (mutation
//! done, local write lost): it is reported as already processed and the
//! claim is kept.

use tracing::{error, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{RequestStatus, RequestType, ReturnRequest};
use crate::shopify::{OrderGateway, RefundLineItem};
use crate::store::RequestStore;

/// Approve a request: re-resolve its platform order, claim the terminal
/// status, then issue the refund (returns) or draft order (exchanges).
pub async fn approve(
    store: &dyn RequestStore,
    gateway: &dyn OrderGateway,
    id: Uuid,
) -> AppResult<ReturnRequest> {
    let request = store.get(id).await?;
    if request.status.is_terminal() {
        return Err(AppError::AlreadyProcessed);
    }

    // Always re-resolve against fresh platform state; the order may have
    // been deleted since submission. Failures here happen before any local
    // write, so the operation stays retryable.
    let order = gateway
        .find_order(&request.shopify_order_number, &request.customer_email)
        .await
        .map_err(|err| AppError::Reconciliation(err.to_string()))?
        .ok_or_else(|| {
            AppError::Reconciliation(format!(
                "order {} is no longer visible on the platform",
                request.shopify_order_number
            ))
        })?;

    match request.request_type {
        RequestType::Return => {
            let claimed = store
                .transition(id, RequestStatus::Requested, RequestStatus::Approved)
                .await?;

            let line_items: Vec<RefundLineItem> = claimed
                .line_items
                .iter()
                .map(|item| RefundLineItem {
                    line_item_id: item.id,
                    quantity: item.quantity,
                })
                .collect();

            match gateway
                .create_refund(claimed.shopify_order_id, &line_items, &order.currency)
                .await
            {
                Ok(refund) => {
                    info!(
                        request_id = %id,
                        order_number = %claimed.shopify_order_number,
                        refund_id = refund.id,
                        "Approved return, refund issued"
                    );
                    Ok(claimed)
                }
                Err(err) if err.is_already_refunded() => {
                    info!(
                        request_id = %id,
                        "Platform reports the refund already exists; keeping approved status"
                    );
                    Err(AppError::AlreadyProcessed)
                }
                Err(err) => {
                    release_claim(store, id, RequestStatus::Approved).await;
                    Err(err.into())
                }
            }
        }
        RequestType::Exchange => {
            let customer_id = order
                .customer
                .as_ref()
                .and_then(|customer| customer.id)
                .ok_or_else(|| {
                    AppError::Validation(
                        "Customer information is missing from the original order.".to_string(),
                    )
                })?;
            let variant_id = request.exchange_for_variant_id.ok_or_else(|| {
                AppError::Validation(
                    "This exchange request has no replacement variant.".to_string(),
                )
            })?;

            let claimed = store
                .transition(id, RequestStatus::Requested, RequestStatus::ExchangeProcessed)
                .await?;

            match gateway
                .create_draft_order(customer_id, variant_id, &claimed.shopify_order_number)
                .await
            {
                Ok(draft) => {
                    info!(
                        request_id = %id,
                        order_number = %claimed.shopify_order_number,
                        draft_order_id = draft.id,
                        "Approved exchange, draft order created"
                    );
                    Ok(claimed)
                }
                Err(err) => {
                    release_claim(store, id, RequestStatus::ExchangeProcessed).await;
                    Err(err.into())
                }
            }
        }
    }
}

/// Reject a request. Purely local; the same atomic guard applies.
pub async fn reject(store: &dyn RequestStore, id: Uuid) -> AppResult<ReturnRequest> {
    let rejected = store
        .transition(id, RequestStatus::Requested, RequestStatus::Rejected)
        .await?;
    info!(request_id = %id, "Rejected return request");
    Ok(rejected)
}

/// Return a claimed-but-unfulfilled request to `requested`. Best effort: if
/// this write also fails the request is stranded terminal without a platform
/// mutation, which an operator can spot from the log.
async fn release_claim(store: &dyn RequestStore, id: Uuid, claimed: RequestStatus) {
    if let Err(release_err) = store.transition(id, claimed, RequestStatus::Requested).await {
        error!(
            request_id = %id,
            error = %release_err,
            "Failed to release claim after platform failure; request stuck in terminal state"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use sqlx::types::Json;

    use super::*;
    use crate::models::{LineItem, NewReturnRequest, RequestFilters, RequestType};
    use crate::shopify::{Customer, DraftOrder, GatewayError, Order, Refund};

    // ── Test doubles ───────────────────────────────────────────────────────────

    #[derive(Default)]
    struct MemoryStore {
        requests: Mutex<HashMap<Uuid, ReturnRequest>>,
    }

    #[async_trait]
    impl RequestStore for MemoryStore {
        async fn insert(&self, new: NewReturnRequest) -> AppResult<ReturnRequest> {
            let now = Utc::now();
            let request = ReturnRequest {
                id: Uuid::new_v4(),
                shopify_order_id: new.shopify_order_id,
                shopify_order_number: new.shopify_order_number,
                customer_email: new.customer_email,
                line_items: Json(new.line_items),
                request_type: new.request_type,
                exchange_for_variant_id: new.exchange_for_variant_id,
                refund_mode: new.refund_mode,
                image_url: new.image_url,
                status: RequestStatus::Requested,
                created_at: now,
                updated_at: now,
            };
            self.requests
                .lock()
                .unwrap()
                .insert(request.id, request.clone());
            Ok(request)
        }

        async fn get(&self, id: Uuid) -> AppResult<ReturnRequest> {
            self.requests
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Return request {} not found", id)))
        }

        async fn list(&self, filters: &RequestFilters) -> AppResult<Vec<ReturnRequest>> {
            let status = filters.status_filter()?;
            let mut requests: Vec<ReturnRequest> = self
                .requests
                .lock()
                .unwrap()
                .values()
                .filter(|r| status.map_or(true, |s| r.status == s))
                .cloned()
                .collect();
            requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(requests)
        }

        async fn transition(
            &self,
            id: Uuid,
            from: RequestStatus,
            to: RequestStatus,
        ) -> AppResult<ReturnRequest> {
            // Single lock acquisition: the compare and the write are one
            // atomic step, like the conditional UPDATE in Postgres.
            let mut requests = self.requests.lock().unwrap();
            match requests.get_mut(&id) {
                None => Err(AppError::NotFound(format!("Return request {} not found", id))),
                Some(request) if request.status != from => Err(AppError::AlreadyProcessed),
                Some(request) => {
                    request.status = to;
                    request.updated_at = Utc::now();
                    Ok(request.clone())
                }
            }
        }
    }

    #[derive(Default)]
    struct MockGateway {
        order: Option<Order>,
        find_fails: bool,
        find_delay: Option<Duration>,
        refund_error: Mutex<Option<GatewayError>>,
        draft_error: Mutex<Option<GatewayError>>,
        refund_calls: AtomicUsize,
        draft_calls: AtomicUsize,
        last_refund: Mutex<Option<(i64, Vec<RefundLineItem>, String)>>,
        last_draft: Mutex<Option<(i64, i64, String)>>,
    }

    impl MockGateway {
        fn resolving(order: Order) -> Self {
            Self {
                order: Some(order),
                ..Self::default()
            }
        }

        fn refund_count(&self) -> usize {
            self.refund_calls.load(Ordering::SeqCst)
        }

        fn draft_count(&self) -> usize {
            self.draft_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrderGateway for MockGateway {
        async fn find_order(
            &self,
            _order_number: &str,
            _email: &str,
        ) -> Result<Option<Order>, GatewayError> {
            if let Some(delay) = self.find_delay {
                tokio::time::sleep(delay).await;
            }
            if self.find_fails {
                return Err(GatewayError::Request("connection refused".to_string()));
            }
            Ok(self.order.clone())
        }

        async fn create_refund(
            &self,
            order_id: i64,
            line_items: &[RefundLineItem],
            currency: &str,
        ) -> Result<Refund, GatewayError> {
            self.refund_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_refund.lock().unwrap() =
                Some((order_id, line_items.to_vec(), currency.to_string()));
            if let Some(err) = self.refund_error.lock().unwrap().take() {
                return Err(err);
            }
            Ok(Refund { id: 42 })
        }

        async fn create_draft_order(
            &self,
            customer_id: i64,
            variant_id: i64,
            original_order_number: &str,
        ) -> Result<DraftOrder, GatewayError> {
            self.draft_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_draft.lock().unwrap() =
                Some((customer_id, variant_id, original_order_number.to_string()));
            if let Some(err) = self.draft_error.lock().unwrap().take() {
                return Err(err);
            }
            Ok(DraftOrder {
                id: 7,
                name: Some("#D1".to_string()),
            })
        }
    }

    // ── Fixtures ───────────────────────────────────────────────────────────────

    fn platform_order(customer_id: Option<i64>) -> Order {
        Order {
            id: 9001,
            name: "#1001".to_string(),
            email: Some("user@example.com".to_string()),
            currency: "USD".to_string(),
            created_at: None,
            customer: customer_id.map(|id| Customer {
                id: Some(id),
                rest: serde_json::Map::new(),
            }),
            shipping_address: None,
            line_items: vec![],
            images: vec![],
        }
    }

    fn return_submission() -> NewReturnRequest {
        NewReturnRequest {
            shopify_order_id: 9001,
            shopify_order_number: "#1001".to_string(),
            customer_email: "user@example.com".to_string(),
            line_items: vec![LineItem {
                id: 11,
                title: "Shirt".to_string(),
                quantity: 2,
                price: "25.00".to_string(),
                variant_id: Some(31),
                product_id: Some(41),
                reason: "Wrong size".to_string(),
            }],
            request_type: RequestType::Return,
            exchange_for_variant_id: None,
            refund_mode: "Not specified".to_string(),
            image_url: None,
        }
    }

    fn exchange_submission() -> NewReturnRequest {
        NewReturnRequest {
            shopify_order_number: "#1002".to_string(),
            request_type: RequestType::Exchange,
            exchange_for_variant_id: Some(777),
            ..return_submission()
        }
    }

    // ── Returns ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn approving_a_return_refunds_and_finalizes() {
        let store = MemoryStore::default();
        let gateway = MockGateway::resolving(platform_order(Some(501)));
        let request = store.insert(return_submission()).await.unwrap();

        let approved = approve(&store, &gateway, request.id).await.unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);

        let (order_id, line_items, currency) = gateway.last_refund.lock().unwrap().clone().unwrap();
        assert_eq!(order_id, 9001);
        assert_eq!(currency, "USD");
        assert_eq!(
            line_items,
            vec![RefundLineItem {
                line_item_id: 11,
                quantity: 2
            }]
        );
        assert_eq!(gateway.refund_count(), 1);
        assert_eq!(gateway.draft_count(), 0, "a return must never draft an exchange order");
    }

    #[tokio::test]
    async fn a_second_approval_is_already_processed() {
        let store = MemoryStore::default();
        let gateway = MockGateway::resolving(platform_order(Some(501)));
        let request = store.insert(return_submission()).await.unwrap();

        approve(&store, &gateway, request.id).await.unwrap();
        let second = approve(&store, &gateway, request.id).await;
        assert!(matches!(second, Err(AppError::AlreadyProcessed)));

        assert_eq!(gateway.refund_count(), 1, "no second refund may be issued");
        let stored = store.get(request.id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn terminal_states_reject_every_further_decision() {
        let store = MemoryStore::default();
        let gateway = MockGateway::resolving(platform_order(Some(501)));
        let request = store.insert(return_submission()).await.unwrap();

        reject(&store, request.id).await.unwrap();

        assert!(matches!(
            approve(&store, &gateway, request.id).await,
            Err(AppError::AlreadyProcessed)
        ));
        assert!(matches!(
            reject(&store, request.id).await,
            Err(AppError::AlreadyProcessed)
        ));
        assert_eq!(gateway.refund_count(), 0);
        assert_eq!(
            store.get(request.id).await.unwrap().status,
            RequestStatus::Rejected
        );
    }

    #[tokio::test]
    async fn unresolvable_order_leaves_the_request_untouched() {
        let store = MemoryStore::default();
        let gateway = MockGateway::default(); // resolves to no order
        let request = store.insert(return_submission()).await.unwrap();

        let result = approve(&store, &gateway, request.id).await;
        assert!(matches!(result, Err(AppError::Reconciliation(_))));
        assert_eq!(
            store.get(request.id).await.unwrap().status,
            RequestStatus::Requested
        );
        assert_eq!(gateway.refund_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_platform_during_resolution_is_retryable() {
        let store = MemoryStore::default();
        let gateway = MockGateway {
            find_fails: true,
            ..MockGateway::default()
        };
        let request = store.insert(return_submission()).await.unwrap();

        let result = approve(&store, &gateway, request.id).await;
        assert!(matches!(result, Err(AppError::Reconciliation(_))));
        assert_eq!(
            store.get(request.id).await.unwrap().status,
            RequestStatus::Requested
        );
    }

    #[tokio::test]
    async fn refund_failure_releases_the_claim_for_retry() {
        let store = MemoryStore::default();
        let gateway = MockGateway::resolving(platform_order(Some(501)));
        *gateway.refund_error.lock().unwrap() = Some(GatewayError::Api {
            status: 500,
            payload: "upstream exploded".to_string(),
        });
        let request = store.insert(return_submission()).await.unwrap();

        let first = approve(&store, &gateway, request.id).await;
        assert!(matches!(first, Err(AppError::Gateway(_))));
        assert_eq!(
            store.get(request.id).await.unwrap().status,
            RequestStatus::Requested,
            "a failed platform call must not consume the request"
        );

        // The retry goes through once the platform recovers.
        let retried = approve(&store, &gateway, request.id).await.unwrap();
        assert_eq!(retried.status, RequestStatus::Approved);
        assert_eq!(gateway.refund_count(), 2);
    }

    #[tokio::test]
    async fn platform_reported_double_refund_counts_as_processed() {
        let store = MemoryStore::default();
        let gateway = MockGateway::resolving(platform_order(Some(501)));
        *gateway.refund_error.lock().unwrap() = Some(GatewayError::Api {
            status: 422,
            payload: "Cannot refund more items than were purchased".to_string(),
        });
        let request = store.insert(return_submission()).await.unwrap();

        let result = approve(&store, &gateway, request.id).await;
        assert!(matches!(result, Err(AppError::AlreadyProcessed)));
        // The refund exists upstream, so the claim is kept rather than released.
        assert_eq!(
            store.get(request.id).await.unwrap().status,
            RequestStatus::Approved
        );
    }

    // ── Exchanges ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn approving_an_exchange_drafts_the_replacement() {
        let store = MemoryStore::default();
        let gateway = MockGateway::resolving(platform_order(Some(501)));
        let request = store.insert(exchange_submission()).await.unwrap();

        let approved = approve(&store, &gateway, request.id).await.unwrap();
        assert_eq!(approved.status, RequestStatus::ExchangeProcessed);

        let (customer_id, variant_id, order_number) =
            gateway.last_draft.lock().unwrap().clone().unwrap();
        assert_eq!(customer_id, 501);
        assert_eq!(variant_id, 777);
        assert_eq!(order_number, "#1002");
        assert_eq!(gateway.draft_count(), 1);
        assert_eq!(gateway.refund_count(), 0, "an exchange must never issue a refund");
    }

    #[tokio::test]
    async fn exchange_without_platform_customer_fails_the_precondition() {
        let store = MemoryStore::default();
        let gateway = MockGateway::resolving(platform_order(None));
        let request = store.insert(exchange_submission()).await.unwrap();

        let result = approve(&store, &gateway, request.id).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(
            store.get(request.id).await.unwrap().status,
            RequestStatus::Requested
        );
        assert_eq!(gateway.draft_count(), 0);
    }

    #[tokio::test]
    async fn draft_order_failure_releases_the_claim() {
        let store = MemoryStore::default();
        let gateway = MockGateway::resolving(platform_order(Some(501)));
        *gateway.draft_error.lock().unwrap() = Some(GatewayError::Request(
            "connection reset by peer".to_string(),
        ));
        let request = store.insert(exchange_submission()).await.unwrap();

        let result = approve(&store, &gateway, request.id).await;
        assert!(matches!(result, Err(AppError::Gateway(_))));
        assert_eq!(
            store.get(request.id).await.unwrap().status,
            RequestStatus::Requested
        );
    }

    // ── Misc ───────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_requests_are_not_found() {
        let store = MemoryStore::default();
        let gateway = MockGateway::resolving(platform_order(Some(501)));

        assert!(matches!(
            approve(&store, &gateway, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            reject(&store, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn stored_line_items_round_trip_unmodified() {
        let store = MemoryStore::default();
        let mut submission = return_submission();
        submission.line_items = (1..=4)
            .map(|id| LineItem {
                id,
                title: format!("Item {id}"),
                quantity: id as i32,
                price: "9.99".to_string(),
                variant_id: Some(100 + id),
                product_id: None,
                reason: "Not specified".to_string(),
            })
            .collect();
        let expected = submission.line_items.clone();

        let created = store.insert(submission).await.unwrap();
        let fetched = store.get(created.id).await.unwrap();
        assert_eq!(fetched.line_items.0, expected);
    }

    #[tokio::test]
    async fn racing_approvals_mutate_the_platform_exactly_once() {
        let store = MemoryStore::default();
        let gateway = MockGateway {
            order: Some(platform_order(Some(501))),
            // Hold both calls inside order resolution so they overlap.
            find_delay: Some(Duration::from_millis(20)),
            ..MockGateway::default()
        };
        let request = store.insert(return_submission()).await.unwrap();

        let (first, second) = tokio::join!(
            approve(&store, &gateway, request.id),
            approve(&store, &gateway, request.id),
        );

        let results = [first, second];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let already = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::AlreadyProcessed)))
            .count();
        assert_eq!(successes, 1, "exactly one approval may win");
        assert_eq!(already, 1, "the loser must see AlreadyProcessed");
        assert_eq!(gateway.refund_count(), 1, "the platform must be mutated exactly once");
        assert_eq!(
            store.get(request.id).await.unwrap().status,
            RequestStatus::Approved
        );
    }
}
