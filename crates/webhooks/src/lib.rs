#![warn(clippy::unwrap_used)]

//! HMAC-signed webhook delivery with bounded retry and exponential backoff.
//! Real `reqwest`-backed delivery with signing and backoff, independent
//! per `(webhook, event)` pair.

mod delivery;
mod signing;

pub use delivery::{DeliveryLog, DeliveryOutcome, Dispatcher, TestDeliveryResult};
pub use signing::sign_body;

use linkforty_core::types::WebhookEventKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping any typed event record for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event: WebhookEventKind,
    pub event_id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub data: serde_json::Value,
}

impl WebhookEvent {
    pub fn new(event: WebhookEventKind, data: serde_json::Value) -> Self {
        Self {
            event,
            event_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            data,
        }
    }
}
