//! Destination selection and parameter appending.

use linkforty_core::types::{DeviceClass, Link, ReasonCode};
use url::Url;

/// The chosen destination before parameter appending.
pub struct Destination {
    pub url: String,
    pub reason: ReasonCode,
    pub is_https: bool,
}

/// Device-aware priority table.
pub fn select(link: &Link, device_class: DeviceClass) -> Destination {
    let app_scheme_url = custom_scheme_url(link);

    match device_class {
        DeviceClass::Ios => {
            if let Some(url) = link.ios_universal_link.clone().filter(|u| !u.is_empty()) {
                return Destination { url, reason: ReasonCode::IosUniversalLink, is_https: true };
            }
            if let Some(url) = app_scheme_url.clone() {
                return Destination { url, reason: ReasonCode::AppScheme, is_https: false };
            }
            if let Some(url) = link.ios_app_store_url.clone().filter(|u| !u.is_empty()) {
                return Destination { url, reason: ReasonCode::IosAppStoreUrl, is_https: true };
            }
            Destination { url: link.origin_url.clone(), reason: ReasonCode::OriginalUrl, is_https: true }
        }
        DeviceClass::Android => {
            if let Some(url) = link.android_app_link.clone().filter(|u| !u.is_empty()) {
                return Destination { url, reason: ReasonCode::AndroidAppLink, is_https: true };
            }
            if let Some(url) = app_scheme_url.clone() {
                return Destination { url, reason: ReasonCode::AppScheme, is_https: false };
            }
            if let Some(url) = link.android_play_store_url.clone().filter(|u| !u.is_empty()) {
                return Destination { url, reason: ReasonCode::AndroidAppStoreUrl, is_https: true };
            }
            Destination { url: link.origin_url.clone(), reason: ReasonCode::OriginalUrl, is_https: true }
        }
        DeviceClass::Web => {
            if let Some(url) = link.web_fallback_url.clone().filter(|u| !u.is_empty()) {
                return Destination { url, reason: ReasonCode::WebFallbackUrl, is_https: true };
            }
            Destination { url: link.origin_url.clone(), reason: ReasonCode::OriginalUrl, is_https: true }
        }
    }
}

/// `{scheme}://{path}` when both `app_scheme` and `deep_link_path` are set.
pub fn custom_scheme_url(link: &Link) -> Option<String> {
    let scheme = link.app_scheme.as_deref().filter(|s| !s.is_empty())?;
    let path = link.deep_link_path.as_deref().filter(|s| !s.is_empty())?;
    let path = path.trim_start_matches('/');
    Some(format!("{scheme}://{path}"))
}

/// Fallback order used by the in-app-browser interstitial once its primary
/// custom-scheme URL has fired: iOS App Store → web fallback → origin.
/// Distinct from `select`'s priority table, which the interstitial
/// deliberately bypasses.
pub fn ios_interstitial_fallback(link: &Link) -> String {
    link.ios_app_store_url
        .clone()
        .filter(|u| !u.is_empty())
        .or_else(|| link.web_fallback_url.clone().filter(|u| !u.is_empty()))
        .unwrap_or_else(|| link.origin_url.clone())
}

/// Append UTM + custom deep-link parameters to the chosen destination.
pub fn append_parameters(destination: &Destination, link: &Link) -> String {
    if destination.is_https {
        append_https_parameters(&destination.url, link)
    } else {
        append_scheme_parameters(&destination.url, link)
    }
}

fn append_https_parameters(url: &str, link: &Link) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    {
        let mut query = parsed.query_pairs_mut();
        for (key, value) in link.utm_parameters.pairs() {
            query.append_pair(key, value);
        }
        for (key, value) in &link.deep_link_parameters {
            query.append_pair(key, value);
        }
    }
    parsed.into()
}

fn append_scheme_parameters(url: &str, link: &Link) -> String {
    if link.deep_link_parameters.is_empty() {
        return url.to_string();
    }
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(link.deep_link_parameters.iter())
        .finish();
    format!("{url}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_link() -> Link {
        Link {
            id: uuid::Uuid::new_v4(),
            short_code: "abc12345".into(),
            template_id: None,
            owner_id: None,
            origin_url: "https://example.com/origin".into(),
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
            is_active: true,
            expires_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn ios_prefers_universal_link() {
        let mut link = base_link();
        link.ios_universal_link = Some("https://shop.example.com/p/42".into());
        let dest = select(&link, DeviceClass::Ios);
        assert_eq!(dest.url, "https://shop.example.com/p/42");
        assert_eq!(dest.reason, ReasonCode::IosUniversalLink);
    }

    #[test]
    fn ios_falls_back_to_custom_scheme_then_store_then_origin() {
        let mut link = base_link();
        link.app_scheme = Some("myapp".into());
        link.deep_link_path = Some("/product/42".into());
        let dest = select(&link, DeviceClass::Ios);
        assert_eq!(dest.url, "myapp://product/42");
        assert_eq!(dest.reason, ReasonCode::AppScheme);
        assert!(!dest.is_https);

        link.app_scheme = None;
        link.ios_app_store_url = Some("https://apps.apple.com/app/id123".into());
        let dest = select(&link, DeviceClass::Ios);
        assert_eq!(dest.reason, ReasonCode::IosAppStoreUrl);

        link.ios_app_store_url = None;
        let dest = select(&link, DeviceClass::Ios);
        assert_eq!(dest.reason, ReasonCode::OriginalUrl);
        assert_eq!(dest.url, link.origin_url);
    }

    #[test]
    fn web_uses_fallback_then_origin() {
        let mut link = base_link();
        let dest = select(&link, DeviceClass::Web);
        assert_eq!(dest.reason, ReasonCode::OriginalUrl);

        link.web_fallback_url = Some("https://m.example.com".into());
        let dest = select(&link, DeviceClass::Web);
        assert_eq!(dest.reason, ReasonCode::WebFallbackUrl);
    }

    #[test]
    fn https_parameter_append_merges_utm_and_custom_params() {
        let mut link = base_link();
        link.utm_parameters.source = Some("newsletter".into());
        link.deep_link_parameters.insert("ref".into(), "abc".into());
        let dest = Destination {
            url: "https://shop.example.com/p/42".into(),
            reason: ReasonCode::IosUniversalLink,
            is_https: true,
        };
        let final_url = append_parameters(&dest, &link);
        assert!(final_url.contains("utm_source=newsletter"));
        assert!(final_url.contains("ref=abc"));
    }

    #[test]
    fn interstitial_fallback_prefers_app_store_then_web_then_origin() {
        let mut link = base_link();
        assert_eq!(ios_interstitial_fallback(&link), link.origin_url);

        link.web_fallback_url = Some("https://m.example.com".into());
        assert_eq!(ios_interstitial_fallback(&link), "https://m.example.com");

        link.ios_app_store_url = Some("https://apps.apple.com/app/id123".into());
        assert_eq!(ios_interstitial_fallback(&link), "https://apps.apple.com/app/id123");
    }

    #[test]
    fn custom_scheme_append_never_adds_utm() {
        let mut link = base_link();
        link.utm_parameters.source = Some("newsletter".into());
        link.deep_link_parameters.insert("ref".into(), "abc".into());
        let dest = Destination {
            url: "myapp://product/42".into(),
            reason: ReasonCode::AppScheme,
            is_https: false,
        };
        let final_url = append_parameters(&dest, &link);
        assert_eq!(final_url, "myapp://product/42?ref=abc");
        assert!(!final_url.contains("utm_source"));
    }
}
