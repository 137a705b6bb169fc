//! Weighted candidate scoring.

use crate::normalize::{normalize_ip, normalize_language, normalize_user_agent};
use linkforty_core::types::FingerprintSignals;

pub const WEIGHT_IP: u8 = 40;
pub const WEIGHT_USER_AGENT: u8 = 30;
pub const WEIGHT_TIMEZONE: u8 = 10;
pub const WEIGHT_LANGUAGE: u8 = 10;
pub const WEIGHT_SCREEN: u8 = 10;

const _WEIGHT_SUM_IS_100: () = assert!(
    WEIGHT_IP as u32 + WEIGHT_USER_AGENT as u32 + WEIGHT_TIMEZONE as u32 + WEIGHT_LANGUAGE as u32 + WEIGHT_SCREEN as u32
        == 100
);

/// The result of comparing one candidate click's fingerprint against an
/// install report's signals.
#[derive(Debug, Clone, Default)]
pub struct ScoreResult {
    pub score: u8,
    pub matched_factors: Vec<&'static str>,
}

/// Score a candidate's stored signals against an install report's signals.
/// A component scores 0 if either side is missing the required signal.
pub fn score(candidate: &FingerprintSignals, report: &FingerprintSignals) -> ScoreResult {
    let mut result = ScoreResult::default();

    if let (Some(a), Some(b)) = (&candidate.ip_address, &report.ip_address) {
        if normalize_ip(a) == normalize_ip(b) {
            result.score += WEIGHT_IP;
            result.matched_factors.push("ip");
        }
    }

    if let (Some(a), Some(b)) = (&candidate.user_agent, &report.user_agent) {
        if normalize_user_agent(a) == normalize_user_agent(b) {
            result.score += WEIGHT_USER_AGENT;
            result.matched_factors.push("user_agent");
        }
    }

    if let (Some(a), Some(b)) = (&candidate.timezone, &report.timezone) {
        if a == b {
            result.score += WEIGHT_TIMEZONE;
            result.matched_factors.push("timezone");
        }
    }

    if let (Some(a), Some(b)) = (&candidate.language, &report.language) {
        if normalize_language(a) == normalize_language(b) {
            result.score += WEIGHT_LANGUAGE;
            result.matched_factors.push("language");
        }
    }

    if let (Some(aw), Some(bw), Some(ah), Some(bh)) = (
        candidate.screen_width,
        report.screen_width,
        candidate.screen_height,
        report.screen_height,
    ) {
        if aw == bw && ah == bh {
            result.score += WEIGHT_SCREEN;
            result.matched_factors.push("screen");
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(ip: &str, ua: &str, tz: &str, lang: &str, w: u32, h: u32) -> FingerprintSignals {
        FingerprintSignals {
            ip_address: Some(ip.into()),
            user_agent: Some(ua.into()),
            timezone: Some(tz.into()),
            language: Some(lang.into()),
            screen_width: Some(w),
            screen_height: Some(h),
            platform: None,
            platform_version: None,
        }
    }

    #[test]
    fn identical_signals_score_100_with_all_factors() {
        let a = signals(
            "203.0.113.17",
            "Mozilla/5.0 (iPhone; …) Safari",
            "America/New_York",
            "en-US",
            1170,
            2532,
        );
        let result = score(&a, &a);
        assert_eq!(result.score, 100);
        assert_eq!(
            result.matched_factors,
            vec!["ip", "user_agent", "timezone", "language", "screen"]
        );
    }

    #[test]
    fn fully_different_signals_score_zero() {
        let a = signals(
            "203.0.113.17",
            "Mozilla/5.0 (iPhone; …) Safari",
            "America/New_York",
            "en-US",
            1170,
            2532,
        );
        let b = signals(
            "198.51.100.5",
            "Mozilla/5.0 (Linux; Android 13; Pixel 8) Chrome",
            "Europe/Berlin",
            "de-DE",
            1080,
            2400,
        );
        let result = score(&a, &b);
        assert_eq!(result.score, 0);
        assert!(result.matched_factors.is_empty());
    }

    #[test]
    fn missing_signal_on_either_side_scores_component_zero() {
        let mut a = signals("1.2.3.4", "ua", "tz", "en", 100, 200);
        a.ip_address = None;
        let b = signals("1.2.3.4", "ua", "tz", "en", 100, 200);
        let result = score(&a, &b);
        assert!(!result.matched_factors.contains(&"ip"));
        assert_eq!(result.score, 100 - WEIGHT_IP);
    }
}
