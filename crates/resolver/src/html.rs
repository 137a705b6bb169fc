//! Interstitial and OG-preview HTML rendering. Every dynamic string is
//! escaped before interpolation.

use linkforty_core::types::Link;

const INTERSTITIAL_TIMEOUT_MS: u32 = 1500;

/// Escape ampersand, angle brackets, quote, and apostrophe. Applied to
/// every user- or link-controlled string before it reaches a template.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// `window.location` to `custom_scheme_url` immediately, falling back to
/// `fallback_url` after 1500 ms, both shown as visible links.
pub fn interstitial(custom_scheme_url: &str, fallback_url: &str) -> String {
    let scheme = escape_html(custom_scheme_url);
    let fallback = escape_html(fallback_url);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Opening app…</title>
<script>
  window.location = "{scheme}";
  setTimeout(function () {{ window.location = "{fallback}"; }}, {timeout});
</script>
</head>
<body>
<p>Opening the app…</p>
<p><a href="{scheme}">Open in app</a></p>
<p><a href="{fallback}">Continue in browser</a></p>
</body>
</html>
"#,
        scheme = scheme,
        fallback = fallback,
        timeout = INTERSTITIAL_TIMEOUT_MS,
    )
}

struct OgTags {
    title: String,
    description: String,
    url: String,
    image_tag: String,
}

fn og_tags(link: &Link) -> OgTags {
    let title = escape_html(link.og_title.as_deref().unwrap_or(&link.short_code));
    let description = escape_html(link.og_description.as_deref().unwrap_or(&link.origin_url));
    let url = escape_html(&link.origin_url);
    let image_tag = link
        .og_image_url
        .as_deref()
        .map(|image| {
            let image = escape_html(image);
            format!(
                "<meta property=\"og:image\" content=\"{image}\">\n<meta name=\"twitter:image\" content=\"{image}\">\n"
            )
        })
        .unwrap_or_default();
    OgTags { title, description, url, image_tag }
}

/// Open Graph + Twitter Card meta tags for social-scraper crawlers. Falls
/// back to title/description/origin when the link's OG fields are unset.
pub fn og_preview(link: &Link) -> String {
    let OgTags { title, description, url, image_tag } = og_tags(link);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<meta property="og:title" content="{title}">
<meta property="og:description" content="{description}">
<meta property="og:url" content="{url}">
{image_tag}<meta name="twitter:card" content="summary_large_image">
<meta name="twitter:title" content="{title}">
<meta name="twitter:description" content="{description}">
</head>
<body>
</body>
</html>
"#
    )
}

/// `GET /{code}/preview`: the same OG/Twitter tags as `og_preview`, plus a
/// `meta http-equiv="refresh"` that sends a human visitor on to the origin
/// URL after the crawler has had a chance to read the tags.
pub fn og_preview_with_refresh(link: &Link) -> String {
    let OgTags { title, description, url, image_tag } = og_tags(link);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="0;url={url}">
<title>{title}</title>
<meta property="og:title" content="{title}">
<meta property="og:description" content="{description}">
<meta property="og:url" content="{url}">
{image_tag}<meta name="twitter:card" content="summary_large_image">
<meta name="twitter:title" content="{title}">
<meta name="twitter:description" content="{description}">
</head>
<body>
<p><a href="{url}">Continue</a></p>
</body>
</html>
"#
    )
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
    fn escapes_all_five_special_characters() {
        let escaped = escape_html(r#"<script>alert('x & "y"')</script>"#);
        assert_eq!(
            escaped,
            "&lt;script&gt;alert(&#39;x &amp; &quot;y&quot;&#39;)&lt;/script&gt;"
        );
    }

    #[test]
    fn interstitial_escapes_both_urls_and_sets_timeout() {
        let html = interstitial(
            "myapp://open?name=<script>",
            "https://example.com?x=\"&y='z'",
        );
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&quot;"));
        assert!(html.contains("&#39;"));
        assert!(html.contains("1500"));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn og_preview_falls_back_to_short_code_and_origin() {
        let link = base_link();
        let html = og_preview(&link);
        assert!(html.contains("og:title\" content=\"abc12345\""));
        assert!(html.contains("og:url\" content=\"https://example.com/origin\""));
        assert!(!html.contains("og:image"));
    }

    #[test]
    fn preview_with_refresh_points_at_origin() {
        let link = base_link();
        let html = og_preview_with_refresh(&link);
        assert!(html.contains(r#"meta http-equiv="refresh" content="0;url=https://example.com/origin""#));
        assert!(html.contains("og:title"));
    }

    #[test]
    fn og_preview_uses_custom_fields_and_escapes_them() {
        let mut link = base_link();
        link.og_title = Some("A & B\"s Launch".into());
        link.og_image_url = Some("https://img.example.com/a.png".into());
        let html = og_preview(&link);
        assert!(html.contains("A &amp; B&quot;s Launch"));
        assert!(html.contains("og:image\" content=\"https://img.example.com/a.png\""));
    }
}
