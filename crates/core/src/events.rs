//! The publish-side seam the Resolver/Click Recorder depend on. The
//! concrete broadcast-backed bus lives in `linkforty-events`, kept out of
//! `linkforty-core` so the dependency order stays leaves-first.

use crate::types::{DeviceClass, ReasonCode, UtmParameters};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured record published on every click.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEventRecord {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub link_id: Uuid,
    pub short_code: String,
    pub owner_id: Option<Uuid>,
    pub ip: String,
    pub ua: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub device_class: DeviceClass,
    pub platform: Option<String>,
    pub redirect_url: String,
    pub reason: ReasonCode,
    pub targeting_matched: bool,
    pub utm: Option<UtmParameters>,
    pub referer: Option<String>,
    pub language: Option<String>,
}

/// Subscriber filter: both fields act as AND filters when present.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub owner_id: Option<Uuid>,
    pub link_id: Option<Uuid>,
}

impl EventFilter {
    pub fn matches(&self, record: &ClickEventRecord) -> bool {
        if let Some(owner_id) = self.owner_id {
            if record.owner_id != Some(owner_id) {
                return false;
            }
        }
        if let Some(link_id) = self.link_id {
            if record.link_id != link_id {
                return false;
            }
        }
        true
    }
}

/// Trait for publishing click events into the bus. Implemented by
/// `linkforty-events::EventBus`; a `NoOpPublisher` below satisfies tests
/// and call sites that do not need a live bus.
pub trait ClickEventPublisher: Send + Sync {
    fn publish(&self, record: ClickEventRecord);
}

pub struct NoOpPublisher;

impl ClickEventPublisher for NoOpPublisher {
    fn publish(&self, _record: ClickEventRecord) {}
}
