//! Persistence of return requests. Handlers and the lifecycle engine depend
//! on the [`RequestStore`] trait; [`PgStore`] is the production backend.

pub mod postgres;

pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{NewReturnRequest, RequestFilters, RequestStatus, ReturnRequest};

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Persist a new request in `requested` state.
    async fn insert(&self, new: NewReturnRequest) -> AppResult<ReturnRequest>;

    /// Fetch a single request, `NotFound` when absent.
    async fn get(&self, id: Uuid) -> AppResult<ReturnRequest>;

    /// Filtered listing, always newest first.
    async fn list(&self, filters: &RequestFilters) -> AppResult<Vec<ReturnRequest>>;

    /// Atomically move a request from `from` to `to` in a single conditional
    /// write. Exactly one caller can win a given transition; losers see
    /// `AlreadyProcessed` (or `NotFound` if the request never existed). This
    /// is the guard that keeps duplicate approvals from double-refunding,
    /// and it must stay a single statement so it holds across processes.
    async fn transition(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
    ) -> AppResult<ReturnRequest>;
}
