use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ─── Link ────────────────────────────────────────────────────────────────

/// A routing rule: maps a short code (optionally scoped by template) to a
/// device-aware set of destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    pub short_code: String,
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
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Link {
    /// An inactive or expired link behaves as if it does not exist.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }

    pub fn cache_key(&self) -> String {
        format!("link:{}", self.short_code)
    }

    pub fn cache_key_for(short_code: &str) -> String {
        format!("link:{short_code}")
    }

    pub fn scoped_cache_key_for(slug: &str, short_code: &str) -> String {
        format!("link:{slug}:{short_code}")
    }
}

pub const MIN_ATTRIBUTION_WINDOW_HOURS: u32 = 1;
pub const MAX_ATTRIBUTION_WINDOW_HOURS: u32 = 2160;
pub const DEFAULT_ATTRIBUTION_WINDOW_HOURS: u32 = 168;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtmParameters {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub term: Option<String>,
    pub content: Option<String>,
}

impl UtmParameters {
    /// `(utm_key, value)` pairs for every populated field, in a fixed
    /// order.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::with_capacity(5);
        if let Some(v) = self.source.as_deref().filter(|s| !s.is_empty()) {
            out.push(("utm_source", v));
        }
        if let Some(v) = self.medium.as_deref().filter(|s| !s.is_empty()) {
            out.push(("utm_medium", v));
        }
        if let Some(v) = self.campaign.as_deref().filter(|s| !s.is_empty()) {
            out.push(("utm_campaign", v));
        }
        if let Some(v) = self.term.as_deref().filter(|s| !s.is_empty()) {
            out.push(("utm_term", v));
        }
        if let Some(v) = self.content.as_deref().filter(|s| !s.is_empty()) {
            out.push(("utm_content", v));
        }
        out
    }
}

/// Typed targeting fields: country codes, device classes, language codes.
/// No sidecar map is needed here (unlike webhook headers / deep-link
/// params) since the set of targeting dimensions is closed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetingRules {
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub devices: Vec<DeviceClass>,
    #[serde(default)]
    pub languages: Vec<String>,
}

impl TargetingRules {
    pub fn is_empty(&self) -> bool {
        self.countries.is_empty() && self.devices.is_empty() && self.languages.is_empty()
    }
}

// ─── Template ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ─── Device / reason taxonomy ───────────────────────────────────────────

/// The single device taxonomy used for both routing and targeting. A
/// coarser `"mobile"/"desktop"` split is intentionally not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Ios,
    Android,
    Web,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Ios => "ios",
            DeviceClass::Android => "android",
            DeviceClass::Web => "web",
        }
    }
}

impl std::str::FromStr for DeviceClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ios" => Ok(DeviceClass::Ios),
            "android" => Ok(DeviceClass::Android),
            "web" => Ok(DeviceClass::Web),
            _ => Err(()),
        }
    }
}

/// Which branch of the destination-selection table produced the chosen
/// URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    IosUniversalLink,
    AndroidAppLink,
    AppScheme,
    IosAppStoreUrl,
    AndroidAppStoreUrl,
    WebFallbackUrl,
    OriginalUrl,
    SdkResolve,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::IosUniversalLink => "ios_universal_link",
            ReasonCode::AndroidAppLink => "android_app_link",
            ReasonCode::AppScheme => "app_scheme",
            ReasonCode::IosAppStoreUrl => "ios_app_store_url",
            ReasonCode::AndroidAppStoreUrl => "android_app_store_url",
            ReasonCode::WebFallbackUrl => "web_fallback_url",
            ReasonCode::OriginalUrl => "original_url",
            ReasonCode::SdkResolve => "sdk_resolve",
        }
    }
}

// ─── Geo ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
}

// ─── ClickEvent ──────────────────────────────────────────────────────────

/// Immutable click record. Clicks are append-only: nothing ever updates
/// or deletes a row once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEvent {
    pub id: Uuid,
    pub link_id: Uuid,
    pub clicked_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub device_type: DeviceClass,
    pub platform: Option<String>,
    pub platform_version: Option<String>,
    pub browser: Option<String>,
    pub geo: GeoInfo,
    pub utm: UtmParameters,
    pub referrer: Option<String>,
}

// ─── DeviceFingerprint ───────────────────────────────────────────────────

/// 1:1 with a ClickEvent. Holds both the canonical hash and the raw
/// signals used later for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub click_id: Uuid,
    pub fingerprint_hash: String,
    pub signals: FingerprintSignals,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FingerprintSignals {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub platform: Option<String>,
    pub platform_version: Option<String>,
}

impl FingerprintSignals {
    /// Canonical `|`-delimited concatenation in the fixed order
    /// `ip|ua|tz|lang|sw|sh|platform|platform_version`, empty string for
    /// any missing component.
    pub fn canonical_string(&self) -> String {
        let sw = self.screen_width.map(|v| v.to_string()).unwrap_or_default();
        let sh = self.screen_height.map(|v| v.to_string()).unwrap_or_default();
        [
            self.ip_address.as_deref().unwrap_or(""),
            self.user_agent.as_deref().unwrap_or(""),
            self.timezone.as_deref().unwrap_or(""),
            self.language.as_deref().unwrap_or(""),
            sw.as_str(),
            sh.as_str(),
            self.platform.as_deref().unwrap_or(""),
            self.platform_version.as_deref().unwrap_or(""),
        ]
        .join("|")
    }
}

// ─── InstallEvent ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallEvent {
    pub id: Uuid,
    pub link_id: Option<Uuid>,
    pub click_id: Option<Uuid>,
    pub fingerprint_hash: String,
    pub confidence_score: Option<u8>,
    pub installed_at: DateTime<Utc>,
    pub first_open_at: DateTime<Utc>,
    pub attribution_window_hours_used: u32,
    pub signals: FingerprintSignals,
    pub device_id: Option<String>,
    pub deep_link_payload: serde_json::Value,
    pub retrieved: bool,
}

// ─── InAppEvent ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InAppEvent {
    pub id: Uuid,
    pub install_id: Uuid,
    pub event_name: String,
    pub properties: HashMap<String, serde_json::Value>,
    pub event_at: DateTime<Utc>,
}

// ─── Webhook ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    ClickEvent,
    InstallEvent,
    ConversionEvent,
}

impl WebhookEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventKind::ClickEvent => "click_event",
            WebhookEventKind::InstallEvent => "install_event",
            WebhookEventKind::ConversionEvent => "conversion_event",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub url: String,
    /// 32 random bytes, hex-encoded. Never re-exposed after create/rotate.
    #[serde(skip_serializing)]
    pub secret: String,
    pub subscribed_events: Vec<WebhookEventKind>,
    pub is_active: bool,
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub headers: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    pub fn subscribes_to(&self, kind: WebhookEventKind) -> bool {
        self.is_active && self.subscribed_events.contains(&kind)
    }
}

pub const MIN_MAX_ATTEMPTS: u32 = 1;
pub const MAX_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_string_exact_layout() {
        let sig = FingerprintSignals {
            ip_address: Some("1.2.3.4".into()),
            user_agent: Some("UA".into()),
            timezone: None,
            language: Some("en".into()),
            screen_width: Some(100),
            screen_height: None,
            platform: None,
            platform_version: None,
        };
        // ip|ua|tz|lang|sw|sh|platform|platform_version
        assert_eq!(sig.canonical_string(), "1.2.3.4|UA||en|100|||");
    }

    #[test]
    fn link_is_live_respects_active_flag_and_expiry() {
        let now = Utc::now();
        let mut link = sample_link(now);
        assert!(link.is_live(now));

        link.is_active = false;
        assert!(!link.is_live(now));

        link.is_active = true;
        link.expires_at = Some(now - chrono::Duration::hours(1));
        assert!(!link.is_live(now));
    }

    fn sample_link(now: DateTime<Utc>) -> Link {
        Link {
            id: Uuid::new_v4(),
            short_code: "abc12345".into(),
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
            attribution_window_hours: DEFAULT_ATTRIBUTION_WINDOW_HOURS,
            is_active: true,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
