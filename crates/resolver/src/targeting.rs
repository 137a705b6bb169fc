//! Targeting-rule enforcement. Any failure yields `NotFound` at the call
//! site — this module only reports match/no match, never which rule
//! failed, so the 404 stays indistinguishable from a plain not-found.

use linkforty_core::types::{DeviceClass, TargetingRules};

pub struct RequestContext<'a> {
    pub country_code: Option<&'a str>,
    pub device_class: DeviceClass,
    pub accept_language: Option<&'a str>,
}

pub fn matches(rules: &TargetingRules, ctx: &RequestContext) -> bool {
    if !rules.countries.is_empty() {
        let matched = ctx
            .country_code
            .map(|code| rules.countries.iter().any(|c| c.eq_ignore_ascii_case(code)))
            .unwrap_or(false);
        if !matched {
            return false;
        }
    }

    if !rules.devices.is_empty() && !rules.devices.contains(&ctx.device_class) {
        return false;
    }

    if !rules.languages.is_empty() {
        let primary = primary_language(ctx.accept_language);
        let matched = primary
            .map(|lang| rules.languages.iter().any(|l| l.eq_ignore_ascii_case(&lang)))
            .unwrap_or(false);
        if !matched {
            return false;
        }
    }

    true
}

/// First two letters of the first `Accept-Language` entry, lowercased.
fn primary_language(accept_language: Option<&str>) -> Option<String> {
    let header = accept_language?;
    let first = header.split(',').next()?.trim();
    let first = first.split(';').next()?.trim();
    if first.len() < 2 {
        return None;
    }
    Some(first[..2].to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(country: Option<&str>, device: DeviceClass, lang: Option<&str>) -> RequestContext<'_> {
        RequestContext {
            country_code: country,
            device_class: device,
            accept_language: lang,
        }
    }

    #[test]
    fn empty_rules_always_match() {
        let rules = TargetingRules::default();
        assert!(matches(&rules, &ctx(None, DeviceClass::Web, None)));
    }

    #[test]
    fn country_mismatch_rejects() {
        let rules = TargetingRules {
            countries: vec!["DE".into()],
            ..Default::default()
        };
        assert!(!matches(&rules, &ctx(Some("US"), DeviceClass::Web, None)));
        assert!(matches(&rules, &ctx(Some("de"), DeviceClass::Web, None)));
    }

    #[test]
    fn device_mismatch_rejects() {
        let rules = TargetingRules {
            devices: vec![DeviceClass::Ios],
            ..Default::default()
        };
        assert!(!matches(&rules, &ctx(None, DeviceClass::Android, None)));
        assert!(matches(&rules, &ctx(None, DeviceClass::Ios, None)));
    }

    #[test]
    fn language_uses_first_two_letters_of_first_entry() {
        let rules = TargetingRules {
            languages: vec!["en".into()],
            ..Default::default()
        };
        assert!(matches(&rules, &ctx(None, DeviceClass::Web, Some("en-US,en;q=0.9"))));
        assert!(!matches(&rules, &ctx(None, DeviceClass::Web, Some("fr-FR,fr;q=0.9"))));
    }
}
