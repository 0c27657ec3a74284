//! Repository contracts over the external transactional store.
//!
//! The conditional updates ([`DeliveryStore::claim`] and friends) are the
//! only synchronization primitive in the system: handlers may run on
//! separate instances with no shared memory, so an in-process mutex would
//! not be a correct substitute.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::chat::{ChatMessage, NewChatMessage, SenderType};
use crate::models::delivery::{DeliveryRequest, DeliveryStatus, NewDeliveryRequest, RequestStatus};
use crate::models::driver::{DriverPresence, DriverProfile};
use crate::models::response::DriverResponse;

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<DeliveryRequest>, AppError>;

    /// The store assigns the integer id.
    async fn insert(
        &self,
        new: NewDeliveryRequest,
        expires_at: DateTime<Utc>,
    ) -> Result<DeliveryRequest, AppError>;

    /// Atomic compare-and-set: Pending -> Accepted + assigned driver, only
    /// if the row is still Pending. Returns false when the claim loses.
    async fn claim(&self, id: i64, driver_id: i64) -> Result<bool, AppError>;

    /// Generic conditional status update; false if the row was not in the
    /// expected state.
    async fn set_request_status(
        &self,
        id: i64,
        expected: RequestStatus,
        new: RequestStatus,
    ) -> Result<bool, AppError>;

    /// Conditional advance of the physical-progress sub-state.
    async fn advance_delivery_status(
        &self,
        id: i64,
        expected: DeliveryStatus,
        new: DeliveryStatus,
    ) -> Result<bool, AppError>;

    async fn active_delivery_for_driver(
        &self,
        driver_id: i64,
    ) -> Result<Option<DeliveryRequest>, AppError>;

    /// Transitions stale Pending rows to Expired; returns the ids touched.
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<i64>, AppError>;
}

#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Returns false when the (request_id, driver_id) pair already has a
    /// recorded response; duplicates are silently dropped.
    async fn record(&self, response: DriverResponse) -> Result<bool, AppError>;

    async fn list_for_request(&self, request_id: i64) -> Result<Vec<DriverResponse>, AppError>;
}

#[async_trait]
pub trait DriverStore: Send + Sync {
    async fn insert_profile(&self, profile: DriverProfile) -> Result<(), AppError>;

    async fn profile(&self, driver_id: i64) -> Result<Option<DriverProfile>, AppError>;

    async fn presence(&self, driver_id: i64) -> Result<Option<DriverPresence>, AppError>;

    /// Last-write-wins; successive pings from the same driver race only
    /// with themselves and staleness is low-impact.
    async fn upsert_presence(&self, presence: DriverPresence) -> Result<(), AppError>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn append(&self, new: NewChatMessage) -> Result<ChatMessage, AppError>;

    async fn list_for_delivery(&self, delivery_id: i64) -> Result<Vec<ChatMessage>, AppError>;

    /// Idempotent; returns false when the message was already read.
    async fn mark_read(&self, message_id: i64) -> Result<bool, AppError>;

    /// Marks every unread message NOT sent by `reader` for the delivery.
    /// Returns the number of rows actually flipped.
    async fn mark_all_read(&self, delivery_id: i64, reader: SenderType) -> Result<u64, AppError>;
}
