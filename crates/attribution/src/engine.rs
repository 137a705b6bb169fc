//! Deferred-attribution engine: candidate scan, weighted scoring,
//! threshold selection, install persistence, deep-link resolution, and
//! conversion-event fan-out.

use crate::scoring::score;
use chrono::Utc;
use linkforty_core::config::AttributionConfig;
use linkforty_core::error::{CoreError, CoreResult};
use linkforty_core::types::{
    FingerprintSignals, InAppEvent, InstallEvent, Link, WebhookEventKind,
};
use linkforty_store::Store;
use linkforty_webhooks::{Dispatcher, WebhookEvent};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Input to the install-report entry point.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallReport {
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub platform: Option<String>,
    pub platform_version: Option<String>,
    pub device_id: Option<String>,
    pub attribution_window_hours: Option<u32>,
}

impl InstallReport {
    fn signals(&self) -> FingerprintSignals {
        FingerprintSignals {
            ip_address: self.ip_address.clone(),
            user_agent: Some(self.user_agent.clone()),
            timezone: self.timezone.clone(),
            language: self.language.clone(),
            screen_width: self.screen_width,
            screen_height: self.screen_height,
            platform: self.platform.clone(),
            platform_version: self.platform_version.clone(),
        }
    }
}

/// Response to an install report.
#[derive(Debug, Clone, Serialize)]
pub struct InstallResult {
    pub install_id: Uuid,
    pub attributed: bool,
    pub confidence_score: u8,
    pub matched_factors: Vec<&'static str>,
    pub deep_link_data: serde_json::Value,
}

pub struct AttributionEngine {
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
    config: AttributionConfig,
}

impl AttributionEngine {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<Dispatcher>, config: AttributionConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    /// End-to-end install handling: candidate query, scoring, selection,
    /// persistence, deep-link resolution, webhook fan-out.
    pub async fn record_install(&self, report: InstallReport) -> CoreResult<InstallResult> {
        let signals = report.signals();
        let fingerprint_hash = fingerprint_hash(&signals);
        let requested_window = report
            .attribution_window_hours
            .unwrap_or(168)
            .min(self.config.max_window_hours);

        let candidates = self
            .store
            .candidate_clicks(self.config.max_candidate_rows, self.config.max_window_hours)
            .await?;

        let now = Utc::now();
        let mut best: Option<(crate::scoring::ScoreResult, &linkforty_store::AttributionCandidate)> = None;

        for candidate in &candidates {
            // Each candidate click is evaluated against *its own* window,
            // bounded further by the caller's override.
            let age_hours = (now - candidate.clicked_at).num_seconds() as f64 / 3600.0;
            let effective_window = candidate.attribution_window_hours.min(requested_window) as f64;
            if age_hours > effective_window {
                continue;
            }

            let result = score(&candidate.signals, &signals);
            if result.score < self.config.confidence_threshold {
                continue;
            }

            match &best {
                Some((best_result, best_candidate)) => {
                    let is_better = result.score > best_result.score
                        || (result.score == best_result.score
                            && candidate.clicked_at > best_candidate.clicked_at);
                    if is_better {
                        best = Some((result, candidate));
                    }
                }
                None => best = Some((result, candidate)),
            }
        }

        let install_id = Uuid::new_v4();
        let now = Utc::now();
        // Insert with an empty payload first; attribution, if any, is
        // attached by a follow-up update.
        let install = InstallEvent {
            id: install_id,
            link_id: None,
            click_id: None,
            fingerprint_hash: fingerprint_hash.clone(),
            confidence_score: None,
            installed_at: now,
            first_open_at: now,
            attribution_window_hours_used: requested_window,
            signals: signals.clone(),
            device_id: report.device_id.clone(),
            deep_link_payload: serde_json::json!({}),
            retrieved: false,
        };
        self.store.insert_install(install).await?;

        let Some((result, candidate)) = best else {
            // Organic: no candidate cleared the threshold. This is not an
            // error — an unattributed install is still recorded.
            info!(install_id = %install_id, "install recorded as organic");
            return Ok(InstallResult {
                install_id,
                attributed: false,
                confidence_score: 0,
                matched_factors: Vec::new(),
                deep_link_data: serde_json::json!({}),
            });
        };

        let link = self.store.get_link_by_id(candidate.link_id).await?;
        let deep_link_data = link
            .as_ref()
            .map(compose_deep_link_payload)
            .unwrap_or_else(|| serde_json::json!({}));

        self.store
            .update_install_attribution(
                install_id,
                candidate.link_id,
                candidate.click_id,
                result.score,
                deep_link_data.clone(),
            )
            .await?;

        info!(
            install_id = %install_id,
            link_id = %candidate.link_id,
            click_id = %candidate.click_id,
            score = result.score,
            "install attributed to prior click"
        );

        if let Some(owner_id) = candidate.owner_id {
            self.fan_out(owner_id, WebhookEventKind::InstallEvent, serde_json::json!({
                "install_id": install_id,
                "link_id": candidate.link_id,
                "click_id": candidate.click_id,
                "confidence_score": result.score,
                "matched_factors": result.matched_factors,
            }))
            .await;
        }

        Ok(InstallResult {
            install_id,
            attributed: true,
            confidence_score: result.score,
            matched_factors: result.matched_factors,
            deep_link_data,
        })
    }

    /// `/api/sdk/v1/attribution/{fingerprint_hex}`.
    pub async fn get_attribution(&self, fingerprint_hex: &str) -> CoreResult<InstallEvent> {
        self.store
            .get_install_by_fingerprint(fingerprint_hex)
            .await?
            .ok_or(CoreError::NotFound)
    }

    /// Records an in-app conversion event against an existing install.
    pub async fn record_in_app_event(
        &self,
        install_id: Uuid,
        event_name: String,
        properties: HashMap<String, serde_json::Value>,
        timestamp: Option<chrono::DateTime<Utc>>,
    ) -> CoreResult<Uuid> {
        let install = self
            .store
            .get_install(install_id)
            .await?
            .ok_or(CoreError::NotFound)?;

        let event = InAppEvent {
            id: Uuid::new_v4(),
            install_id,
            event_name: event_name.clone(),
            properties: properties.clone(),
            event_at: timestamp.unwrap_or_else(Utc::now),
        };
        self.store.insert_in_app_event(event.clone()).await?;

        if let Some(link_id) = install.link_id {
            if let Ok(Some(link)) = self.store.get_link_by_id(link_id).await {
                if let Some(owner_id) = link.owner_id {
                    self.fan_out(
                        owner_id,
                        WebhookEventKind::ConversionEvent,
                        serde_json::json!({
                            "install_id": install_id,
                            "event_name": event_name,
                            "properties": properties,
                            "event_at": event.event_at,
                        }),
                    )
                    .await;
                }
            }
        }

        Ok(event.id)
    }

    /// Fire-and-forget webhook fan-out: never fails the caller.
    async fn fan_out(&self, owner_id: Uuid, kind: WebhookEventKind, data: serde_json::Value) {
        match self.store.webhooks_for_owner_event(owner_id, kind).await {
            Ok(webhooks) => {
                let event = WebhookEvent::new(kind, data);
                for webhook in webhooks {
                    self.dispatcher.deliver(webhook, event.clone());
                }
            }
            Err(err) => {
                warn!(owner_id = %owner_id, error = %err, "failed to look up webhooks for fan-out");
            }
        }
    }
}

/// SHA-256 of the canonical `|`-delimited signal concatenation, hex-encoded
/// — the same hash the click recorder computes for a fingerprint.
pub fn fingerprint_hash(signals: &FingerprintSignals) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signals.canonical_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Compose the deep-link payload handed back to the mobile SDK.
fn compose_deep_link_payload(link: &Link) -> serde_json::Value {
    serde_json::json!({
        "short_code": link.short_code,
        "origin_url": link.origin_url,
        "ios_app_store_url": link.ios_app_store_url,
        "android_play_store_url": link.android_play_store_url,
        "web_fallback_url": link.web_fallback_url,
        "ios_universal_link": link.ios_universal_link,
        "android_app_link": link.android_app_link,
        "app_scheme": link.app_scheme,
        "deep_link_path": link.deep_link_path,
        "deep_link_parameters": link.deep_link_parameters,
        "utm_parameters": link.utm_parameters,
        "targeting_rules": link.targeting_rules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkforty_core::types::{ClickEvent, DeviceClass, DeviceFingerprint};
    use linkforty_store::{InMemoryStore, NewLink};

    fn sample_new_link() -> NewLink {
        NewLink {
            template_id: None,
            owner_id: Some(Uuid::new_v4()),
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
        }
    }

    fn report_matching(signals: &FingerprintSignals) -> InstallReport {
        InstallReport {
            ip_address: signals.ip_address.clone(),
            user_agent: signals.user_agent.clone().unwrap_or_default(),
            timezone: signals.timezone.clone(),
            language: signals.language.clone(),
            screen_width: signals.screen_width,
            screen_height: signals.screen_height,
            platform: signals.platform.clone(),
            platform_version: signals.platform_version.clone(),
            device_id: None,
            attribution_window_hours: None,
        }
    }

    async fn setup_with_click() -> (AttributionEngine, FingerprintSignals) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let link = store.create_link(sample_new_link()).await.unwrap();

        let signals = FingerprintSignals {
            ip_address: Some("203.0.113.17".into()),
            user_agent: Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Safari".into()),
            timezone: Some("America/New_York".into()),
            language: Some("en-US".into()),
            screen_width: Some(1170),
            screen_height: Some(2532),
            platform: Some("iOS".into()),
            platform_version: Some("17.0".into()),
        };

        let click = ClickEvent {
            id: Uuid::new_v4(),
            link_id: link.id,
            clicked_at: Utc::now() - chrono::Duration::hours(2),
            ip_address: signals.ip_address.clone().unwrap(),
            user_agent: signals.user_agent.clone().unwrap(),
            device_type: DeviceClass::Ios,
            platform: signals.platform.clone(),
            platform_version: signals.platform_version.clone(),
            browser: None,
            geo: Default::default(),
            utm: Default::default(),
            referrer: None,
        };
        let fp = DeviceFingerprint {
            click_id: click.id,
            fingerprint_hash: fingerprint_hash(&signals),
            signals: signals.clone(),
        };
        store.insert_click(click).await.unwrap();
        store.insert_fingerprint(fp).await.unwrap();

        let dispatcher = Arc::new(Dispatcher::new());
        let engine = AttributionEngine::new(store, dispatcher, AttributionConfig::default());
        (engine, signals)
    }

    #[tokio::test]
    async fn identical_signals_attribute_with_full_confidence() {
        let (engine, signals) = setup_with_click().await;
        let result = engine.record_install(report_matching(&signals)).await.unwrap();
        assert!(result.attributed);
        assert_eq!(result.confidence_score, 100);
        assert_eq!(result.deep_link_data["origin_url"], "https://example.com");
    }

    #[tokio::test]
    async fn dissimilar_signals_are_organic() {
        let (engine, _signals) = setup_with_click().await;
        let report = InstallReport {
            ip_address: Some("198.51.100.5".into()),
            user_agent: "Mozilla/5.0 (Linux; Android 13; Pixel 8) Chrome".into(),
            timezone: Some("Europe/Berlin".into()),
            language: Some("de-DE".into()),
            screen_width: Some(1080),
            screen_height: Some(2400),
            platform: None,
            platform_version: None,
            device_id: None,
            attribution_window_hours: None,
        };
        let result = engine.record_install(report).await.unwrap();
        assert!(!result.attributed);
        assert_eq!(result.confidence_score, 0);
        assert_eq!(result.deep_link_data, serde_json::json!({}));
    }

    #[tokio::test]
    async fn below_threshold_partial_match_is_organic() {
        let (engine, signals) = setup_with_click().await;
        let mut report = report_matching(&signals);
        // Only IP + UA match (70 points) — below default threshold needs >= 70,
        // so push it under by also diverging IP.
        report.timezone = Some("Europe/Berlin".into());
        report.language = Some("de-DE".into());
        report.screen_width = Some(1080);
        report.ip_address = Some("1.2.3.4".into());
        let result = engine.record_install(report).await.unwrap();
        assert!(!result.attributed);
    }
}
