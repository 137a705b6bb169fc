#![warn(clippy::unwrap_used)]

//! Durable persistence seam. `PgStore` is the production implementation
//! (Postgres via sqlx); `InMemoryStore` backs tests and local development,
//! mirroring the same contract.

mod memory;
mod postgres;
mod shortcode;

pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use shortcode::generate_short_code;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linkforty_core::error::CoreResult;
use linkforty_core::types::{
    ClickEvent, DeviceFingerprint, FingerprintSignals, InAppEvent, InstallEvent, Link, Template,
    UtmParameters, TargetingRules, Webhook, WebhookEventKind,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Fields needed to create a link. `short_code` is chosen by the store
/// (generated and retried on conflict); callers never supply one directly.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub template_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub origin_url: String,
    pub ios_app_store_url: Option<String>,
    pub android_play_store_url: Option<String>,
    pub web_fallback_url: Option<String>,
    pub ios_universal_link: Option<String>,
    pub android_app_link: Option<String>,
    pub app_scheme: Option<String>,
    pub deep_link_path: Option<String>,
    pub deep_link_parameters: HashMap<String, String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image_url: Option<String>,
    pub utm_parameters: UtmParameters,
    pub targeting_rules: TargetingRules,
    pub attribution_window_hours: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial update to a link. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateLink {
    pub origin_url: Option<String>,
    pub ios_app_store_url: Option<Option<String>>,
    pub android_play_store_url: Option<Option<String>>,
    pub web_fallback_url: Option<Option<String>>,
    pub ios_universal_link: Option<Option<String>>,
    pub android_app_link: Option<Option<String>>,
    pub app_scheme: Option<Option<String>>,
    pub deep_link_path: Option<Option<String>>,
    pub deep_link_parameters: Option<HashMap<String, String>>,
    pub og_title: Option<Option<String>>,
    pub og_description: Option<Option<String>>,
    pub og_image_url: Option<Option<String>>,
    pub utm_parameters: Option<UtmParameters>,
    pub targeting_rules: Option<TargetingRules>,
    pub attribution_window_hours: Option<u32>,
    pub is_active: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// One scoreable candidate for deferred attribution: a past click, the
/// fingerprint signals captured with it, and the per-link window it must
/// be evaluated against.
#[derive(Debug, Clone)]
pub struct AttributionCandidate {
    pub click_id: Uuid,
    pub link_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub clicked_at: DateTime<Utc>,
    pub attribution_window_hours: u32,
    pub signals: FingerprintSignals,
}

/// Partial update to a webhook. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateWebhook {
    pub name: Option<String>,
    pub url: Option<String>,
    pub subscribed_events: Option<Vec<WebhookEventKind>>,
    pub is_active: Option<bool>,
    pub max_attempts: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
}

/// The full persistence contract. Every method maps directly to one of
/// the operations the rest of the system needs from durable storage; see
/// the `postgres` and `memory` implementations for the two backends.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_link(&self, new_link: NewLink) -> CoreResult<Link>;
    async fn get_link_by_id(&self, id: Uuid) -> CoreResult<Option<Link>>;
    async fn get_link_by_code(&self, short_code: &str) -> CoreResult<Option<Link>>;
    async fn get_link_scoped(&self, slug: &str, short_code: &str) -> CoreResult<Option<Link>>;
    async fn update_link(&self, id: Uuid, update: UpdateLink) -> CoreResult<Link>;
    async fn delete_link(&self, id: Uuid) -> CoreResult<()>;

    async fn get_template_by_slug(&self, slug: &str) -> CoreResult<Option<Template>>;

    async fn insert_click(&self, click: ClickEvent) -> CoreResult<()>;
    async fn insert_fingerprint(&self, fingerprint: DeviceFingerprint) -> CoreResult<()>;

    /// Recent clicks joined to their fingerprints and owning links,
    /// newest first, bounded by `max_rows` and `max_window_hours`.
    async fn candidate_clicks(
        &self,
        max_rows: u32,
        max_window_hours: u32,
    ) -> CoreResult<Vec<AttributionCandidate>>;

    async fn insert_install(&self, install: InstallEvent) -> CoreResult<()>;
    async fn update_install_attribution(
        &self,
        install_id: Uuid,
        link_id: Uuid,
        click_id: Uuid,
        confidence_score: u8,
        deep_link_payload: serde_json::Value,
    ) -> CoreResult<()>;
    async fn get_install(&self, id: Uuid) -> CoreResult<Option<InstallEvent>>;
    async fn get_install_by_fingerprint(&self, fingerprint_hash: &str)
        -> CoreResult<Option<InstallEvent>>;

    async fn insert_in_app_event(&self, event: InAppEvent) -> CoreResult<()>;

    async fn webhooks_for_owner_event(
        &self,
        owner_id: Uuid,
        kind: WebhookEventKind,
    ) -> CoreResult<Vec<Webhook>>;
    async fn create_webhook(&self, webhook: Webhook) -> CoreResult<Webhook>;
    async fn update_webhook(&self, id: Uuid, update: UpdateWebhook) -> CoreResult<Webhook>;
    async fn delete_webhook(&self, id: Uuid) -> CoreResult<()>;
    async fn get_webhook(&self, id: Uuid) -> CoreResult<Option<Webhook>>;
}
