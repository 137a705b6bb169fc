//! Top-level orchestration: cache-then-store lookup, targeting, destination
//! selection, interstitial/scraper branching, and off-path click recording.

use crate::click_recorder::{ClickContext, ClickRecorder};
use crate::destination::{self, Destination};
use crate::geo::geolocate_ip;
use crate::html;
use crate::targeting::{self, RequestContext};
use crate::ua;
use linkforty_cache::LinkCache;
use linkforty_core::error::{CoreError, CoreResult};
use linkforty_core::types::{DeviceClass, Link, ReasonCode, UtmParameters};
use linkforty_store::Store;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Everything the caller needs to answer an inbound `/{code}` or
/// `/{slug}/{code}` request.
pub struct ResolveRequest<'a> {
    pub short_code: &'a str,
    pub slug: Option<&'a str>,
    pub ip_address: &'a str,
    pub user_agent: &'a str,
    pub accept_language: Option<&'a str>,
    pub referer: Option<&'a str>,
    pub utm: UtmParameters,
}

/// What the Resolver decided to do with this request.
pub enum ResolveOutcome {
    Redirect { url: String, reason: ReasonCode },
    Interstitial(String),
    ScraperHtml(String),
    NotFound,
}

pub struct Resolver {
    store: Arc<dyn Store>,
    cache: Option<Arc<LinkCache>>,
    recorder: Arc<ClickRecorder>,
}

impl Resolver {
    /// `cache` is optional — its absence does not degrade correctness.
    /// When `None`, every lookup goes straight to the store.
    pub fn new(store: Arc<dyn Store>, cache: Option<Arc<LinkCache>>, recorder: Arc<ClickRecorder>) -> Self {
        Self { store, cache, recorder }
    }

    /// The public redirect path: `GET /{code}` or `GET /{slug}/{code}`.
    #[instrument(skip(self, req), fields(code = %req.short_code))]
    pub async fn resolve(&self, req: ResolveRequest<'_>) -> CoreResult<ResolveOutcome> {
        let Some(link) = self.lookup(req.short_code, req.slug).await? else {
            return Ok(ResolveOutcome::NotFound);
        };

        if ua::is_social_scraper(req.user_agent) {
            return Ok(ResolveOutcome::ScraperHtml(html::og_preview(&link)));
        }

        let device_class = ua::device_class(req.user_agent);
        if !passes_targeting(&link, req.ip_address, device_class, req.accept_language) {
            return Ok(ResolveOutcome::NotFound);
        }

        let outcome = decide(&link, device_class, req.user_agent);
        let (redirect_url, reason) = match &outcome {
            ResolveOutcome::Redirect { url, reason } => (url.clone(), *reason),
            ResolveOutcome::Interstitial(_) => {
                let scheme_url = destination::custom_scheme_url(&link)
                    .unwrap_or_else(|| destination::ios_interstitial_fallback(&link));
                (scheme_url, ReasonCode::AppScheme)
            }
            ResolveOutcome::ScraperHtml(_) | ResolveOutcome::NotFound => unreachable!(),
        };

        self.spawn_click_recording(&link, &req, redirect_url, reason, true);
        Ok(outcome)
    }

    /// The SDK-resolve entry point: same lookup and click recording, but
    /// targeting is not enforced and the result is the deep-link payload
    /// rather than a redirect.
    #[instrument(skip(self, req), fields(code = %req.short_code))]
    pub async fn resolve_sdk(&self, req: ResolveRequest<'_>) -> CoreResult<serde_json::Value> {
        let Some(link) = self.lookup(req.short_code, req.slug).await? else {
            return Err(CoreError::NotFound);
        };

        self.spawn_click_recording(
            &link,
            &req,
            link.origin_url.clone(),
            ReasonCode::SdkResolve,
            false,
        );

        Ok(deep_link_payload(&link))
    }

    /// `GET /{code}/preview`: always an OG/meta-refresh document, no
    /// targeting enforcement and no click recorded — this is a preview
    /// card render, not a navigation.
    #[instrument(skip(self), fields(code = %short_code))]
    pub async fn resolve_preview(&self, short_code: &str, slug: Option<&str>) -> CoreResult<String> {
        let link = self.lookup(short_code, slug).await?.ok_or(CoreError::NotFound)?;
        Ok(html::og_preview_with_refresh(&link))
    }

    async fn lookup(&self, short_code: &str, slug: Option<&str>) -> CoreResult<Option<Link>> {
        let cached = match &self.cache {
            Some(cache) => {
                let result = match slug {
                    Some(slug) => cache.get_scoped(slug, short_code).await,
                    None => cache.get(short_code).await,
                };
                match result {
                    Ok(cached) => cached,
                    Err(err) => {
                        warn!(error = %err, "cache unavailable during lookup, falling through to store");
                        None
                    }
                }
            }
            None => None,
        };
        if let Some(link) = cached {
            if link.is_live(chrono::Utc::now()) {
                return Ok(Some(link));
            }
            return Ok(None);
        }

        let stored = match slug {
            Some(slug) => self.store.get_link_scoped(slug, short_code).await?,
            None => self.store.get_link_by_code(short_code).await?,
        };
        let Some(link) = stored else {
            return Ok(None);
        };
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(&link, slug).await {
                warn!(error = %err, "cache unavailable while writing back resolved link");
            }
        }
        Ok(Some(link))
    }

    fn spawn_click_recording(
        &self,
        link: &Link,
        req: &ResolveRequest<'_>,
        redirect_url: String,
        reason: ReasonCode,
        targeting_matched: bool,
    ) {
        let recorder = self.recorder.clone();
        let ctx = ClickContext {
            link: link.clone(),
            ip_address: req.ip_address.to_string(),
            user_agent: req.user_agent.to_string(),
            utm: req.utm.clone(),
            referer: req.referer.map(str::to_string),
            redirect_url,
            reason,
            targeting_matched,
        };
        tokio::spawn(async move { recorder.record(ctx).await });
    }
}

fn passes_targeting(
    link: &Link,
    ip_address: &str,
    device_class: DeviceClass,
    accept_language: Option<&str>,
) -> bool {
    let geo = geolocate_ip(ip_address);
    let ctx = RequestContext {
        country_code: geo.country_code.as_deref(),
        device_class,
        accept_language,
    };
    targeting::matches(&link.targeting_rules, &ctx)
}

/// In-app-browser interstitial vs. ordinary destination selection.
fn decide(link: &Link, device_class: DeviceClass, user_agent: &str) -> ResolveOutcome {
    if device_class == DeviceClass::Ios
        && ua::is_in_app_browser(user_agent)
        && destination::custom_scheme_url(link).is_some()
    {
        let scheme_url = destination::custom_scheme_url(link).expect("checked above");
        let fallback = destination::ios_interstitial_fallback(link);
        return ResolveOutcome::Interstitial(html::interstitial(&scheme_url, &fallback));
    }

    let destination: Destination = destination::select(link, device_class);
    let reason = destination.reason;
    let url = destination::append_parameters(&destination, link);
    ResolveOutcome::Redirect { url, reason }
}

/// Deep-link payload returned by the SDK-resolve variant and (on a
/// successful match) by the Attribution Engine's install report.
pub fn deep_link_payload(link: &Link) -> serde_json::Value {
    serde_json::json!({
        "link_id": link.id,
        "short_code": link.short_code,
        "origin_url": link.origin_url,
        "ios_universal_link": link.ios_universal_link,
        "android_app_link": link.android_app_link,
        "app_scheme": link.app_scheme,
        "deep_link_path": link.deep_link_path,
        "deep_link_parameters": link.deep_link_parameters,
        "web_fallback_url": link.web_fallback_url,
        "utm_parameters": link.utm_parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkforty_core::types::TargetingRules;
    use linkforty_store::{InMemoryStore, NewLink};
    use std::collections::HashMap;

    fn new_link_fixture() -> NewLink {
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
            utm_parameters: Default::default(),
            targeting_rules: TargetingRules::default(),
            attribution_window_hours: 168,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn ios_universal_link_wins_for_plain_safari() {
        let memory = InMemoryStore::new();
        let mut new_link = new_link_fixture();
        new_link.ios_universal_link = Some("https://shop.example.com/p/42".into());
        new_link.app_scheme = Some("myapp".into());
        new_link.deep_link_path = Some("/p/42".into());
        let link = memory.create_link(new_link).await.expect("create link");

        let safari_ua =
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Safari/604.1";
        assert!(!ua::is_in_app_browser(safari_ua));

        let outcome = decide(&link, DeviceClass::Ios, safari_ua);
        match outcome {
            ResolveOutcome::Redirect { reason, .. } => assert_eq!(reason, ReasonCode::IosUniversalLink),
            _ => panic!("expected a redirect"),
        }
    }

    #[tokio::test]
    async fn gmail_in_app_browser_gets_interstitial_with_custom_scheme() {
        let memory = InMemoryStore::new();
        let mut new_link = new_link_fixture();
        new_link.ios_universal_link = Some("https://shop.example.com/p/42".into());
        new_link.app_scheme = Some("myapp".into());
        new_link.deep_link_path = Some("/p/42".into());
        new_link.web_fallback_url = Some("https://m.example.com".into());
        let link = memory.create_link(new_link).await.expect("create link");

        let gsa_ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) GSA/214.0 Mobile/15E148 Safari/604.1";
        let outcome = decide(&link, DeviceClass::Ios, gsa_ua);
        match outcome {
            ResolveOutcome::Interstitial(html) => {
                assert!(html.contains("myapp://p/42"));
                assert!(html.contains("https://m.example.com"));
            }
            _ => panic!("expected an interstitial"),
        }
    }

    #[tokio::test]
    async fn targeting_rejects_out_of_scope_country() {
        let memory = InMemoryStore::new();
        let mut new_link = new_link_fixture();
        new_link.targeting_rules = TargetingRules {
            countries: vec!["DE".into()],
            ..Default::default()
        };
        let link = memory.create_link(new_link).await.expect("create link");

        // 8.8.8.8 resolves to US in the static geo table.
        assert!(!passes_targeting(&link, "8.8.8.8", DeviceClass::Web, None));
    }

    #[tokio::test]
    async fn resolve_preview_renders_og_tags_without_recording_a_click() {
        let memory = InMemoryStore::new();
        let mut new_link = new_link_fixture();
        new_link.og_title = Some("Launch day".into());
        let link = memory.create_link(new_link).await.expect("create link");
        let store: Arc<dyn Store> = Arc::new(memory);
        let recorder = Arc::new(ClickRecorder::new(
            store.clone(),
            Arc::new(linkforty_core::events::NoOpPublisher),
            Arc::new(linkforty_webhooks::Dispatcher::new()),
        ));
        let resolver = Resolver::new(store.clone(), None, recorder);

        let html = resolver.resolve_preview(&link.short_code, None).await.unwrap();
        assert!(html.contains("Launch day"));
        assert!(html.contains("refresh"));

        let candidates = store.candidate_clicks(1000, 2160).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn android_without_app_link_falls_back_to_scheme_then_origin() {
        let memory = InMemoryStore::new();
        let new_link = new_link_fixture();
        let link = memory.create_link(new_link).await.expect("create link");

        let outcome = decide(
            &link,
            DeviceClass::Android,
            "Mozilla/5.0 (Linux; Android 13; Pixel 8)",
        );
        match outcome {
            ResolveOutcome::Redirect { url, reason } => {
                assert_eq!(reason, ReasonCode::OriginalUrl);
                assert_eq!(url, link.origin_url);
            }
            _ => panic!("expected a redirect"),
        }
    }
}
