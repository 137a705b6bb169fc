//! Per-signal normalization rules used by the scorer.

/// IPv4 -> first three dotted octets, IPv6 -> first four colon-separated
/// groups, everything else -> identity.
pub fn normalize_ip(ip: &str) -> String {
    if ip.parse::<std::net::Ipv4Addr>().is_ok() {
        let parts: Vec<&str> = ip.split('.').collect();
        if parts.len() == 4 {
            return parts[..3].join(".");
        }
    }
    if ip.parse::<std::net::Ipv6Addr>().is_ok() {
        let parts: Vec<&str> = ip.split(':').collect();
        if parts.len() >= 4 {
            return parts[..4].join(":");
        }
    }
    ip.to_string()
}

const PLATFORM_TOKENS: &[&str] = &["iPhone", "iPad", "Android", "Windows", "Macintosh", "Linux"];
const BROWSER_TOKENS: &[&str] = &["Chrome", "Safari", "Firefox", "Edge", "Opera"];

/// `{platform}|{browser}` (lowercased), each token empty if no match.
pub fn normalize_user_agent(ua: &str) -> String {
    let platform = PLATFORM_TOKENS
        .iter()
        .find(|tok| ua.contains(*tok))
        .copied()
        .unwrap_or("");
    let browser = BROWSER_TOKENS
        .iter()
        .find(|tok| ua.contains(*tok))
        .copied()
        .unwrap_or("");
    format!("{platform}|{browser}").to_lowercase()
}

/// First two characters, lowercased.
pub fn normalize_language(lang: &str) -> String {
    lang.chars().take(2).collect::<String>().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_normalizes_to_first_three_octets() {
        assert_eq!(normalize_ip("203.0.113.17"), "203.0.113");
        assert_eq!(normalize_ip("203.0.113.200"), "203.0.113");
    }

    #[test]
    fn ipv6_normalizes_to_first_four_groups() {
        assert_eq!(normalize_ip("2001:db8:1234:5678:9abc::1"), "2001:db8:1234:5678");
    }

    #[test]
    fn non_ip_identity() {
        assert_eq!(normalize_ip("not-an-ip"), "not-an-ip");
    }

    #[test]
    fn user_agent_extracts_platform_and_browser_tokens() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Safari/604.1";
        assert_eq!(normalize_user_agent(ua), "iphone|safari");
    }

    #[test]
    fn user_agent_missing_tokens_produce_empty_segments() {
        assert_eq!(normalize_user_agent("curl/8.0"), "|");
    }

    #[test]
    fn language_takes_first_two_chars_lowercased() {
        assert_eq!(normalize_language("en-US"), "en");
        assert_eq!(normalize_language("FR"), "fr");
    }
}
