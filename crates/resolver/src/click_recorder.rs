//! Off-path click persistence. Runs after the response has already been
//! sent; every step here is logged-and-suppressed on failure, never
//! surfaced to the original requester.

use crate::geo::geolocate_ip;
use crate::ua::{device_class, parse_user_agent};
use linkforty_core::events::{ClickEventPublisher, ClickEventRecord};
use linkforty_core::types::{
    ClickEvent, DeviceFingerprint, FingerprintSignals, Link, ReasonCode, UtmParameters,
    WebhookEventKind,
};
use linkforty_store::Store;
use linkforty_webhooks::{Dispatcher, WebhookEvent};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Everything the Resolver derived about one public request, handed off to
/// the Click Recorder.
pub struct ClickContext {
    pub link: Link,
    pub ip_address: String,
    pub user_agent: String,
    pub utm: UtmParameters,
    pub referer: Option<String>,
    pub redirect_url: String,
    pub reason: ReasonCode,
    pub targeting_matched: bool,
}

pub struct ClickRecorder {
    store: Arc<dyn Store>,
    events: Arc<dyn ClickEventPublisher>,
    dispatcher: Arc<Dispatcher>,
}

impl ClickRecorder {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn ClickEventPublisher>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self { store, events, dispatcher }
    }

    /// Runs the full click-recording work list. Intended to be spawned as
    /// an independent task; never awaited by the request handler.
    pub async fn record(&self, ctx: ClickContext) {
        // Client-supplied `fp_*` query overrides are intentionally not
        // honored here: the public redirect ignores them to close a
        // spoofing vector, accepting fingerprint overrides only in the
        // authenticated `/api/sdk/v1/install` body.
        let parsed_ua = parse_user_agent(&ctx.user_agent);
        let device = device_class(&ctx.user_agent);
        let geo = geolocate_ip(&ctx.ip_address);

        let click_id = Uuid::new_v4();
        let clicked_at = chrono::Utc::now();

        let click = ClickEvent {
            id: click_id,
            link_id: ctx.link.id,
            clicked_at,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            device_type: device,
            platform: parsed_ua.platform.clone(),
            platform_version: parsed_ua.platform_version.clone(),
            browser: parsed_ua.browser.clone(),
            geo: geo.clone(),
            utm: ctx.utm.clone(),
            referrer: ctx.referer.clone(),
        };

        if let Err(err) = self.store.insert_click(click).await {
            warn!(click_id = %click_id, error = %err, "failed to insert click event");
            return;
        }

        let signals = FingerprintSignals {
            ip_address: Some(ctx.ip_address.clone()),
            user_agent: Some(ctx.user_agent.clone()),
            timezone: None,
            language: None,
            screen_width: None,
            screen_height: None,
            platform: parsed_ua.platform.clone(),
            platform_version: parsed_ua.platform_version.clone(),
        };
        let fingerprint_hash = hash_canonical(&signals);
        let fingerprint = DeviceFingerprint {
            click_id,
            fingerprint_hash,
            signals,
        };
        if let Err(err) = self.store.insert_fingerprint(fingerprint).await {
            warn!(click_id = %click_id, error = %err, "failed to insert device fingerprint");
        }

        self.events.publish(ClickEventRecord {
            event_id: Uuid::new_v4(),
            timestamp: clicked_at,
            link_id: ctx.link.id,
            short_code: ctx.link.short_code.clone(),
            owner_id: ctx.link.owner_id,
            ip: ctx.ip_address.clone(),
            ua: ctx.user_agent.clone(),
            country: geo.country_code.clone(),
            city: geo.city.clone(),
            device_class: device,
            platform: parsed_ua.platform.clone(),
            redirect_url: ctx.redirect_url.clone(),
            reason: ctx.reason,
            targeting_matched: ctx.targeting_matched,
            utm: Some(ctx.utm.clone()),
            referer: ctx.referer.clone(),
            language: None,
        });

        let Some(owner_id) = ctx.link.owner_id else {
            return;
        };
        match self
            .store
            .webhooks_for_owner_event(owner_id, WebhookEventKind::ClickEvent)
            .await
        {
            Ok(webhooks) => {
                if webhooks.is_empty() {
                    return;
                }
                let payload = serde_json::json!({
                    "click_id": click_id,
                    "link_id": ctx.link.id,
                    "short_code": ctx.link.short_code,
                    "redirect_url": ctx.redirect_url,
                    "reason": ctx.reason.as_str(),
                    "device_class": device,
                    "country": geo.country_code,
                    "clicked_at": clicked_at,
                });
                let event = WebhookEvent::new(WebhookEventKind::ClickEvent, payload);
                for webhook in webhooks {
                    self.dispatcher.deliver(webhook, event.clone());
                }
            }
            Err(err) => {
                warn!(owner_id = %owner_id, error = %err, "failed to look up click_event webhooks");
            }
        }
    }
}

/// SHA-256 over the canonical `|`-joined signal string, hex-encoded.
fn hash_canonical(signals: &FingerprintSignals) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signals.canonical_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkforty_core::events::NoOpPublisher;
    use linkforty_store::{InMemoryStore, NewLink};
    use std::collections::HashMap;

    async fn seeded_link(store: &InMemoryStore) -> Link {
        store
            .create_link(NewLink {
                template_id: None,
                owner_id: None,
                origin_url: "https://example.com".into(),
                ios_app_store_url: None,
                android_play_store_url: None,
                web_fallback_url: None,
                ios_universal_link: None,
                android_app_link: None,
                app_scheme: None,
                deep_link_path: None,
                deep_link_parameters: HashMap::new(),
                og_title: None,
                og_description: None,
                og_image_url: None,
                utm_parameters: Default::default(),
                targeting_rules: Default::default(),
                attribution_window_hours: 168,
                expires_at: None,
            })
            .await
            .expect("create link")
    }

    #[tokio::test]
    async fn records_click_and_fingerprint_without_webhooks() {
        let memory = InMemoryStore::new();
        let link = seeded_link(&memory).await;
        let store: Arc<dyn Store> = Arc::new(memory);

        let recorder = ClickRecorder::new(
            store.clone(),
            Arc::new(NoOpPublisher),
            Arc::new(Dispatcher::new()),
        );

        recorder
            .record(ClickContext {
                link: link.clone(),
                ip_address: "8.8.8.8".into(),
                user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)".into(),
                utm: Default::default(),
                referer: None,
                redirect_url: "https://example.com".into(),
                reason: ReasonCode::OriginalUrl,
                targeting_matched: true,
            })
            .await;

        let candidates = store.candidate_clicks(1000, 2160).await.expect("candidates");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].link_id, link.id);
        assert_eq!(candidates[0].signals.ip_address.as_deref(), Some("8.8.8.8"));
    }
}
