#![warn(clippy::unwrap_used)]

//! The link-resolution pipeline: short-code lookup through the two-tier
//! cache, targeting enforcement, device-aware destination selection,
//! in-app-browser interstitial and social-scraper branches, and off-path
//! click + fingerprint persistence.

mod click_recorder;
mod destination;
mod geo;
mod html;
mod resolver;
mod targeting;
mod ua;

pub use click_recorder::{ClickContext, ClickRecorder};
pub use destination::{append_parameters, custom_scheme_url, ios_interstitial_fallback, select, Destination};
pub use geo::{country_name_for_code, geolocate_ip};
pub use html::{escape_html, interstitial, og_preview, og_preview_with_refresh};
pub use resolver::{deep_link_payload, ResolveOutcome, ResolveRequest, Resolver};
pub use targeting::RequestContext;
pub use ua::{device_class, is_in_app_browser, is_social_scraper, parse_user_agent, ParsedUserAgent};
