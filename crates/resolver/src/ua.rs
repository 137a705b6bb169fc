//! User-Agent derived signals: device class, platform/browser parsing,
//! in-app-browser detection, and social-scraper detection.

use linkforty_core::types::DeviceClass;

/// `iphone|ipad|ipod` -> ios, `android` -> android, else web. Case-insensitive
/// substring match.
pub fn device_class(user_agent: &str) -> DeviceClass {
    let ua = user_agent.to_ascii_lowercase();
    if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
        DeviceClass::Ios
    } else if ua.contains("android") {
        DeviceClass::Android
    } else {
        DeviceClass::Web
    }
}

const IN_APP_BROWSER_MARKERS: &[&str] = &[
    "gsa/", "fban", "fbav", "instagram", "twitter", "linkedinapp", "micromessenger",
    "outlook", "yahoomail",
];

/// Gmail (`GSA/`), Facebook (`FBAN|FBAV`), Instagram, Twitter, LinkedIn,
/// WeChat (`MicroMessenger`), Outlook, Yahoo Mail.
pub fn is_in_app_browser(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    IN_APP_BROWSER_MARKERS.iter().any(|marker| ua.contains(marker))
}

const SOCIAL_SCRAPER_MARKERS: &[&str] = &[
    "facebookexternalhit",
    "facebot",
    "twitterbot",
    "linkedinbot",
    "slackbot",
    "discordbot",
    "telegrambot",
    "whatsapp",
    "pinterestbot",
    "skypeuripreview",
    "googlebot",
    "bingbot",
    "ia_archiver",
];

/// Known search/social crawler User-Agents that should see OG preview HTML
/// instead of a redirect.
pub fn is_social_scraper(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    SOCIAL_SCRAPER_MARKERS.iter().any(|marker| ua.contains(marker))
}

/// Parsed `{platform, platform_version, browser}` for click-row enrichment.
#[derive(Debug, Clone, Default)]
pub struct ParsedUserAgent {
    pub platform: Option<String>,
    pub platform_version: Option<String>,
    pub browser: Option<String>,
}

const PLATFORM_MARKERS: &[(&str, &str)] = &[
    ("iphone", "iOS"),
    ("ipad", "iOS"),
    ("ipod", "iOS"),
    ("android", "Android"),
    ("windows", "Windows"),
    ("macintosh", "macOS"),
    ("linux", "Linux"),
];

const BROWSER_MARKERS: &[(&str, &str)] = &[
    ("edg/", "Edge"),
    ("opr/", "Opera"),
    ("chrome/", "Chrome"),
    ("crios/", "Chrome"),
    ("firefox/", "Firefox"),
    ("fxios/", "Firefox"),
    ("safari/", "Safari"),
];

pub fn parse_user_agent(user_agent: &str) -> ParsedUserAgent {
    let lower = user_agent.to_ascii_lowercase();

    let platform = PLATFORM_MARKERS
        .iter()
        .find(|(marker, _)| lower.contains(marker))
        .map(|(_, name)| name.to_string());

    let platform_version = platform.as_deref().and_then(|p| extract_platform_version(&lower, p));

    let browser = BROWSER_MARKERS
        .iter()
        .find(|(marker, _)| lower.contains(marker))
        .map(|(_, name)| name.to_string());

    ParsedUserAgent {
        platform,
        platform_version,
        browser,
    }
}

fn extract_platform_version(lower: &str, platform: &str) -> Option<String> {
    let marker = match platform {
        "iOS" => "os ",
        "Android" => "android ",
        _ => return None,
    };
    let start = lower.find(marker)? + marker.len();
    let rest = &lower[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '_' || c == '.'))
        .unwrap_or(rest.len());
    let version = &rest[..end];
    if version.is_empty() {
        None
    } else {
        Some(version.replace('_', "."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ios_devices_classified_correctly() {
        assert_eq!(
            device_class("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)"),
            DeviceClass::Ios
        );
        assert_eq!(device_class("Mozilla/5.0 (iPad; CPU OS 16_0)"), DeviceClass::Ios);
    }

    #[test]
    fn android_devices_classified_correctly() {
        assert_eq!(
            device_class("Mozilla/5.0 (Linux; Android 13; Pixel 8)"),
            DeviceClass::Android
        );
    }

    #[test]
    fn everything_else_is_web() {
        assert_eq!(device_class("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"), DeviceClass::Web);
    }

    #[test]
    fn gmail_in_app_browser_detected() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) GSA/214.0 Mobile/15E148 Safari/604.1";
        assert!(is_in_app_browser(ua));
    }

    #[test]
    fn facebook_in_app_browser_detected() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0) [FBAN/FBIOS;FBAV/400.0]";
        assert!(is_in_app_browser(ua));
    }

    #[test]
    fn ordinary_mobile_safari_is_not_in_app() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Safari/604.1";
        assert!(!is_in_app_browser(ua));
    }

    #[test]
    fn facebook_scraper_detected() {
        assert!(is_social_scraper("facebookexternalhit/1.1"));
        assert!(is_social_scraper("Twitterbot/1.0"));
        assert!(is_social_scraper("Googlebot/2.1"));
    }

    #[test]
    fn parses_ios_platform_version_and_browser() {
        let parsed = parse_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Safari/604.1",
        );
        assert_eq!(parsed.platform.as_deref(), Some("iOS"));
        assert_eq!(parsed.platform_version.as_deref(), Some("17.0"));
        assert_eq!(parsed.browser.as_deref(), Some("Safari"));
    }
}
