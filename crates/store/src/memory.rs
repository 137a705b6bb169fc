//! In-memory store backed by DashMap.
//!
//! Used for local development and tests; the production entry point
//! wires up `PgStore` instead (see `linkforty-server`'s `main.rs`).

use crate::shortcode::generate_short_code;
use crate::{AttributionCandidate, NewLink, Store, UpdateLink, UpdateWebhook};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use linkforty_core::error::{CoreError, CoreResult};
use linkforty_core::types::{
    ClickEvent, DeviceFingerprint, InAppEvent, InstallEvent, Link, Template, Webhook,
    WebhookEventKind,
};
use tracing::{info, warn};
use uuid::Uuid;

const MAX_SHORT_CODE_ATTEMPTS: u32 = 10;

pub struct InMemoryStore {
    links: DashMap<Uuid, Link>,
    links_by_code: DashMap<String, Uuid>,
    templates: DashMap<String, Template>,
    clicks: DashMap<Uuid, ClickEvent>,
    fingerprints: DashMap<Uuid, DeviceFingerprint>, // keyed by click_id
    installs: DashMap<Uuid, InstallEvent>,
    in_app_events: DashMap<Uuid, InAppEvent>,
    webhooks: DashMap<Uuid, Webhook>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        info!("in-memory store initialized (development mode)");
        Self {
            links: DashMap::new(),
            links_by_code: DashMap::new(),
            templates: DashMap::new(),
            clicks: DashMap::new(),
            fingerprints: DashMap::new(),
            installs: DashMap::new(),
            in_app_events: DashMap::new(),
            webhooks: DashMap::new(),
        }
    }

    /// Register a template so slug-scoped lookups can resolve it. Not part
    /// of the public `Store` contract (no template-create endpoint is
    /// specified); exposed for test setup.
    pub fn seed_template(&self, template: Template) {
        self.templates.insert(template.slug.clone(), template);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_link(&self, new_link: NewLink) -> CoreResult<Link> {
        for attempt in 0..MAX_SHORT_CODE_ATTEMPTS {
            let code = generate_short_code();
            if self.links_by_code.contains_key(&code) {
                warn!(attempt, code, "short code collision, retrying");
                continue;
            }
            let now = Utc::now();
            let link = Link {
                id: Uuid::new_v4(),
                short_code: code.clone(),
                template_id: new_link.template_id,
                owner_id: new_link.owner_id,
                origin_url: new_link.origin_url,
                ios_app_store_url: new_link.ios_app_store_url,
                android_play_store_url: new_link.android_play_store_url,
                web_fallback_url: new_link.web_fallback_url,
                ios_universal_link: new_link.ios_universal_link,
                android_app_link: new_link.android_app_link,
                app_scheme: new_link.app_scheme,
                deep_link_path: new_link.deep_link_path,
                deep_link_parameters: new_link.deep_link_parameters,
                og_title: new_link.og_title,
                og_description: new_link.og_description,
                og_image_url: new_link.og_image_url,
                utm_parameters: new_link.utm_parameters,
                targeting_rules: new_link.targeting_rules,
                attribution_window_hours: new_link.attribution_window_hours,
                is_active: true,
                expires_at: new_link.expires_at,
                created_at: now,
                updated_at: now,
            };
            self.links_by_code.insert(code, link.id);
            self.links.insert(link.id, link.clone());
            return Ok(link);
        }
        Err(CoreError::DuplicateShortCode(MAX_SHORT_CODE_ATTEMPTS))
    }

    async fn get_link_by_id(&self, id: Uuid) -> CoreResult<Option<Link>> {
        Ok(self.links.get(&id).map(|r| r.value().clone()))
    }

    async fn get_link_by_code(&self, short_code: &str) -> CoreResult<Option<Link>> {
        let now = Utc::now();
        let Some(id) = self.links_by_code.get(short_code).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self
            .links
            .get(&id)
            .map(|r| r.value().clone())
            .filter(|link| link.is_live(now)))
    }

    async fn get_link_scoped(&self, slug: &str, short_code: &str) -> CoreResult<Option<Link>> {
        let now = Utc::now();
        let Some(template) = self.templates.get(slug).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        let Some(id) = self.links_by_code.get(short_code).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self
            .links
            .get(&id)
            .map(|r| r.value().clone())
            .filter(|link| link.is_live(now) && link.template_id == Some(template.id)))
    }

    async fn update_link(&self, id: Uuid, update: UpdateLink) -> CoreResult<Link> {
        let mut entry = self.links.get_mut(&id).ok_or(CoreError::NotFound)?;
        let link = entry.value_mut();
        if let Some(v) = update.origin_url {
            link.origin_url = v;
        }
        if let Some(v) = update.ios_app_store_url {
            link.ios_app_store_url = v;
        }
        if let Some(v) = update.android_play_store_url {
            link.android_play_store_url = v;
        }
        if let Some(v) = update.web_fallback_url {
            link.web_fallback_url = v;
        }
        if let Some(v) = update.ios_universal_link {
            link.ios_universal_link = v;
        }
        if let Some(v) = update.android_app_link {
            link.android_app_link = v;
        }
        if let Some(v) = update.app_scheme {
            link.app_scheme = v;
        }
        if let Some(v) = update.deep_link_path {
            link.deep_link_path = v;
        }
        if let Some(v) = update.deep_link_parameters {
            link.deep_link_parameters = v;
        }
        if let Some(v) = update.og_title {
            link.og_title = v;
        }
        if let Some(v) = update.og_description {
            link.og_description = v;
        }
        if let Some(v) = update.og_image_url {
            link.og_image_url = v;
        }
        if let Some(v) = update.utm_parameters {
            link.utm_parameters = v;
        }
        if let Some(v) = update.targeting_rules {
            link.targeting_rules = v;
        }
        if let Some(v) = update.attribution_window_hours {
            link.attribution_window_hours = v;
        }
        if let Some(v) = update.is_active {
            link.is_active = v;
        }
        if let Some(v) = update.expires_at {
            link.expires_at = v;
        }
        link.updated_at = Utc::now();
        Ok(link.clone())
    }

    async fn delete_link(&self, id: Uuid) -> CoreResult<()> {
        if let Some((_, link)) = self.links.remove(&id) {
            self.links_by_code.remove(&link.short_code);
        }
        Ok(())
    }

    async fn get_template_by_slug(&self, slug: &str) -> CoreResult<Option<Template>> {
        Ok(self.templates.get(slug).map(|r| r.value().clone()))
    }

    async fn insert_click(&self, click: ClickEvent) -> CoreResult<()> {
        self.clicks.insert(click.id, click);
        Ok(())
    }

    async fn insert_fingerprint(&self, fingerprint: DeviceFingerprint) -> CoreResult<()> {
        self.fingerprints.insert(fingerprint.click_id, fingerprint);
        Ok(())
    }

    async fn candidate_clicks(
        &self,
        max_rows: u32,
        max_window_hours: u32,
    ) -> CoreResult<Vec<AttributionCandidate>> {
        let cutoff = Utc::now() - chrono::Duration::hours(max_window_hours as i64);
        let mut candidates: Vec<AttributionCandidate> = self
            .clicks
            .iter()
            .filter(|entry| entry.value().clicked_at > cutoff)
            .filter_map(|entry| {
                let click = entry.value();
                let fingerprint = self.fingerprints.get(&click.id)?;
                let link = self.links.get(&click.link_id)?;
                Some(AttributionCandidate {
                    click_id: click.id,
                    link_id: click.link_id,
                    owner_id: link.owner_id,
                    clicked_at: click.clicked_at,
                    attribution_window_hours: link.attribution_window_hours,
                    signals: fingerprint.signals.clone(),
                })
            })
            .collect();
        candidates.sort_by(|a, b| b.clicked_at.cmp(&a.clicked_at));
        candidates.truncate(max_rows as usize);
        Ok(candidates)
    }

    async fn insert_install(&self, install: InstallEvent) -> CoreResult<()> {
        self.installs.insert(install.id, install);
        Ok(())
    }

    async fn update_install_attribution(
        &self,
        install_id: Uuid,
        link_id: Uuid,
        click_id: Uuid,
        confidence_score: u8,
        deep_link_payload: serde_json::Value,
    ) -> CoreResult<()> {
        let mut entry = self.installs.get_mut(&install_id).ok_or(CoreError::NotFound)?;
        let install = entry.value_mut();
        install.link_id = Some(link_id);
        install.click_id = Some(click_id);
        install.confidence_score = Some(confidence_score);
        install.deep_link_payload = deep_link_payload;
        install.retrieved = true;
        Ok(())
    }

    async fn get_install(&self, id: Uuid) -> CoreResult<Option<InstallEvent>> {
        Ok(self.installs.get(&id).map(|r| r.value().clone()))
    }

    async fn get_install_by_fingerprint(
        &self,
        fingerprint_hash: &str,
    ) -> CoreResult<Option<InstallEvent>> {
        let mut matches: Vec<InstallEvent> = self
            .installs
            .iter()
            .filter(|r| r.value().fingerprint_hash == fingerprint_hash)
            .map(|r| r.value().clone())
            .collect();
        matches.sort_by(|a, b| b.installed_at.cmp(&a.installed_at));
        Ok(matches.into_iter().next())
    }

    async fn insert_in_app_event(&self, event: InAppEvent) -> CoreResult<()> {
        self.in_app_events.insert(event.id, event);
        Ok(())
    }

    async fn webhooks_for_owner_event(
        &self,
        owner_id: Uuid,
        kind: WebhookEventKind,
    ) -> CoreResult<Vec<Webhook>> {
        Ok(self
            .webhooks
            .iter()
            .map(|r| r.value().clone())
            .filter(|w| w.owner_id == Some(owner_id) && w.subscribes_to(kind))
            .collect())
    }

    async fn create_webhook(&self, webhook: Webhook) -> CoreResult<Webhook> {
        self.webhooks.insert(webhook.id, webhook.clone());
        Ok(webhook)
    }

    async fn update_webhook(&self, id: Uuid, update: UpdateWebhook) -> CoreResult<Webhook> {
        let mut entry = self.webhooks.get_mut(&id).ok_or(CoreError::NotFound)?;
        let webhook = entry.value_mut();
        if let Some(v) = update.name {
            webhook.name = v;
        }
        if let Some(v) = update.url {
            webhook.url = v;
        }
        if let Some(v) = update.subscribed_events {
            webhook.subscribed_events = v;
        }
        if let Some(v) = update.is_active {
            webhook.is_active = v;
        }
        if let Some(v) = update.max_attempts {
            webhook.max_attempts = v;
        }
        if let Some(v) = update.timeout_ms {
            webhook.timeout_ms = v;
        }
        if let Some(v) = update.headers {
            webhook.headers = v;
        }
        webhook.updated_at = Utc::now();
        Ok(webhook.clone())
    }

    async fn delete_webhook(&self, id: Uuid) -> CoreResult<()> {
        self.webhooks.remove(&id);
        Ok(())
    }

    async fn get_webhook(&self, id: Uuid) -> CoreResult<Option<Webhook>> {
        Ok(self.webhooks.get(&id).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkforty_core::types::{TargetingRules, UtmParameters};
    use std::collections::HashMap;

    fn sample_new_link() -> NewLink {
        NewLink {
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
            utm_parameters: UtmParameters::default(),
            targeting_rules: TargetingRules::default(),
            attribution_window_hours: 168,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn create_then_lookup_by_code_round_trips() {
        let store = InMemoryStore::new();
        let link = store.create_link(sample_new_link()).await.unwrap();
        let found = store.get_link_by_code(&link.short_code).await.unwrap();
        assert_eq!(found.unwrap().id, link.id);
    }

    #[tokio::test]
    async fn inactive_link_is_invisible_to_code_lookup() {
        let store = InMemoryStore::new();
        let link = store.create_link(sample_new_link()).await.unwrap();
        store
            .update_link(
                link.id,
                UpdateLink {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(store.get_link_by_code(&link.short_code).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn candidate_clicks_respects_window_bound() {
        let store = InMemoryStore::new();
        let link = store.create_link(sample_new_link()).await.unwrap();
        let old_click = ClickEvent {
            id: Uuid::new_v4(),
            link_id: link.id,
            clicked_at: Utc::now() - chrono::Duration::hours(200),
            ip_address: "1.1.1.1".into(),
            user_agent: "ua".into(),
            device_type: linkforty_core::types::DeviceClass::Ios,
            platform: None,
            platform_version: None,
            browser: None,
            geo: Default::default(),
            utm: Default::default(),
            referrer: None,
        };
        let fp = DeviceFingerprint {
            click_id: old_click.id,
            fingerprint_hash: "hash".into(),
            signals: Default::default(),
        };
        store.insert_click(old_click).await.unwrap();
        store.insert_fingerprint(fp).await.unwrap();

        let candidates = store.candidate_clicks(1000, 100).await.unwrap();
        assert!(candidates.is_empty());
    }
}
