//! In-memory store backing the binary and tests. The dashmap entry locks
//! make the conditional updates atomic, matching the contract the
//! external transactional store provides in production.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::chat::{ChatMessage, NewChatMessage, SenderType};
use crate::models::delivery::{DeliveryRequest, DeliveryStatus, NewDeliveryRequest, RequestStatus};
use crate::models::driver::{DriverPresence, DriverProfile};
use crate::models::response::DriverResponse;
use crate::store::{ChatStore, DeliveryStore, DriverStore, ResponseStore};

pub struct MemoryStore {
    deliveries: DashMap<i64, DeliveryRequest>,
    delivery_seq: AtomicI64,
    responses: DashMap<(i64, i64), DriverResponse>,
    profiles: DashMap<i64, DriverProfile>,
    presence: DashMap<i64, DriverPresence>,
    messages: DashMap<i64, ChatMessage>,
    message_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            deliveries: DashMap::new(),
            delivery_seq: AtomicI64::new(1),
            responses: DashMap::new(),
            profiles: DashMap::new(),
            presence: DashMap::new(),
            messages: DashMap::new(),
            message_seq: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn get(&self, id: i64) -> Result<Option<DeliveryRequest>, AppError> {
        Ok(self.deliveries.get(&id).map(|entry| entry.value().clone()))
    }

    async fn insert(
        &self,
        new: NewDeliveryRequest,
        expires_at: DateTime<Utc>,
    ) -> Result<DeliveryRequest, AppError> {
        let id = self.delivery_seq.fetch_add(1, Ordering::SeqCst);
        let request = DeliveryRequest {
            id,
            customer_id: new.customer_id,
            pickup: new.pickup,
            pickup_address: new.pickup_address,
            dropoff: new.dropoff,
            dropoff_address: new.dropoff_address,
            fare: new.fare,
            distance_km: new.distance_km,
            package: new.package,
            recipient_phone: new.recipient_phone,
            status: RequestStatus::Pending,
            delivery_status: None,
            assigned_driver_id: None,
            expires_at,
            created_at: Utc::now(),
        };

        self.deliveries.insert(id, request.clone());
        Ok(request)
    }

    async fn claim(&self, id: i64, driver_id: i64) -> Result<bool, AppError> {
        let Some(mut entry) = self.deliveries.get_mut(&id) else {
            return Ok(false);
        };

        if entry.status != RequestStatus::Pending {
            return Ok(false);
        }

        entry.status = RequestStatus::Accepted;
        entry.delivery_status = Some(DeliveryStatus::Accepted);
        entry.assigned_driver_id = Some(driver_id);
        Ok(true)
    }

    async fn set_request_status(
        &self,
        id: i64,
        expected: RequestStatus,
        new: RequestStatus,
    ) -> Result<bool, AppError> {
        let Some(mut entry) = self.deliveries.get_mut(&id) else {
            return Ok(false);
        };

        if entry.status != expected {
            return Ok(false);
        }

        entry.status = new;
        Ok(true)
    }

    async fn advance_delivery_status(
        &self,
        id: i64,
        expected: DeliveryStatus,
        new: DeliveryStatus,
    ) -> Result<bool, AppError> {
        let Some(mut entry) = self.deliveries.get_mut(&id) else {
            return Ok(false);
        };

        if entry.delivery_status != Some(expected) {
            return Ok(false);
        }

        entry.delivery_status = Some(new);
        Ok(true)
    }

    async fn active_delivery_for_driver(
        &self,
        driver_id: i64,
    ) -> Result<Option<DeliveryRequest>, AppError> {
        let active = self.deliveries.iter().find_map(|entry| {
            let request = entry.value();
            if request.assigned_driver_id == Some(driver_id)
                && request.status == RequestStatus::Accepted
            {
                Some(request.clone())
            } else {
                None
            }
        });

        Ok(active)
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<i64>, AppError> {
        let mut expired = Vec::new();

        for mut entry in self.deliveries.iter_mut() {
            if entry.status == RequestStatus::Pending && entry.expires_at <= now {
                entry.status = RequestStatus::Expired;
                expired.push(entry.id);
            }
        }

        Ok(expired)
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn record(&self, response: DriverResponse) -> Result<bool, AppError> {
        let key = (response.request_id, response.driver_id);
        if self.responses.contains_key(&key) {
            return Ok(false);
        }

        self.responses.insert(key, response);
        Ok(true)
    }

    async fn list_for_request(&self, request_id: i64) -> Result<Vec<DriverResponse>, AppError> {
        let mut responses: Vec<DriverResponse> = self
            .responses
            .iter()
            .filter(|entry| entry.key().0 == request_id)
            .map(|entry| entry.value().clone())
            .collect();

        responses.sort_by_key(|r| r.responded_at);
        Ok(responses)
    }
}

#[async_trait]
impl DriverStore for MemoryStore {
    async fn insert_profile(&self, profile: DriverProfile) -> Result<(), AppError> {
        self.profiles.insert(profile.id, profile);
        Ok(())
    }

    async fn profile(&self, driver_id: i64) -> Result<Option<DriverProfile>, AppError> {
        Ok(self.profiles.get(&driver_id).map(|entry| entry.value().clone()))
    }

    async fn presence(&self, driver_id: i64) -> Result<Option<DriverPresence>, AppError> {
        Ok(self.presence.get(&driver_id).map(|entry| entry.value().clone()))
    }

    async fn upsert_presence(&self, presence: DriverPresence) -> Result<(), AppError> {
        self.presence.insert(presence.driver_id, presence);
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn append(&self, new: NewChatMessage) -> Result<ChatMessage, AppError> {
        let id = self.message_seq.fetch_add(1, Ordering::SeqCst);
        let message = ChatMessage {
            id,
            delivery_id: new.delivery_id,
            sender_type: new.sender_type,
            sender_id: new.sender_id,
            message_type: new.message_type,
            content: new.content,
            image_url: new.image_url,
            is_read: false,
            created_at: Utc::now(),
        };

        self.messages.insert(id, message.clone());
        Ok(message)
    }

    async fn list_for_delivery(&self, delivery_id: i64) -> Result<Vec<ChatMessage>, AppError> {
        let mut messages: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|entry| entry.value().delivery_id == delivery_id)
            .map(|entry| entry.value().clone())
            .collect();

        messages.sort_by_key(|m| (m.created_at, m.id));
        Ok(messages)
    }

    async fn mark_read(&self, message_id: i64) -> Result<bool, AppError> {
        let Some(mut entry) = self.messages.get_mut(&message_id) else {
            return Err(AppError::NotFound(format!(
                "message {message_id} not found"
            )));
        };

        if entry.is_read {
            return Ok(false);
        }

        entry.is_read = true;
        Ok(true)
    }

    async fn mark_all_read(
        &self,
        delivery_id: i64,
        reader: SenderType,
    ) -> Result<u64, AppError> {
        let mut flipped = 0;

        for mut entry in self.messages.iter_mut() {
            let message = entry.value_mut();
            if message.delivery_id == delivery_id
                && message.sender_type != reader
                && !message.is_read
            {
                message.is_read = true;
                flipped += 1;
            }
        }

        Ok(flipped)
    }
}
