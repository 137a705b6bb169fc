//! The public redirect surface: `GET /{code}`, `GET /{slug}/{code}`,
//! and `GET /{code}/preview`. Latency-critical — everything below returns
//! before the Click Recorder's off-path writes even start.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use linkforty_core::types::UtmParameters;
use linkforty_resolver::{ResolveOutcome, ResolveRequest};
use std::collections::HashMap;
use std::net::SocketAddr;

/// `GET /{code}`.
pub async fn resolve_code(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    resolve(&state, &short_code, None, addr, &headers, &query).await
}

/// `GET /{slug}/{code}` — template-scoped redirect.
pub async fn resolve_scoped_code(
    State(state): State<AppState>,
    Path((slug, short_code)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    resolve(&state, &short_code, Some(&slug), addr, &headers, &query).await
}

/// `GET /{code}/preview` — always an OG/meta-refresh document.
pub async fn preview_code(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
) -> Result<Html<String>, ApiError> {
    let html = state.resolver.resolve_preview(&short_code, None).await?;
    Ok(Html(html))
}

/// `GET /{slug}/{code}/preview`.
pub async fn preview_scoped_code(
    State(state): State<AppState>,
    Path((slug, short_code)): Path<(String, String)>,
) -> Result<Html<String>, ApiError> {
    let html = state.resolver.resolve_preview(&short_code, Some(&slug)).await?;
    Ok(Html(html))
}

async fn resolve(
    state: &AppState,
    short_code: &str,
    slug: Option<&str>,
    addr: SocketAddr,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    let req = ResolveRequest {
        short_code,
        slug,
        ip_address: &addr.ip().to_string(),
        user_agent: header_str(headers, "user-agent").unwrap_or(""),
        accept_language: header_str(headers, "accept-language"),
        referer: header_str(headers, "referer"),
        utm: utm_from_query(query),
    };

    match state.resolver.resolve(req).await? {
        ResolveOutcome::Redirect { url, .. } => Ok(Redirect::found(&url).into_response()),
        ResolveOutcome::Interstitial(html) => Ok(Html(html).into_response()),
        ResolveOutcome::ScraperHtml(html) => Ok(Html(html).into_response()),
        ResolveOutcome::NotFound => Ok((StatusCode::NOT_FOUND, "not found").into_response()),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `utm_{source,medium,campaign,term,content}` captured from the request
/// query, appended to the destination URL and recorded on the click.
fn utm_from_query(query: &HashMap<String, String>) -> UtmParameters {
    UtmParameters {
        source: query.get("utm_source").cloned(),
        medium: query.get("utm_medium").cloned(),
        campaign: query.get("utm_campaign").cloned(),
        term: query.get("utm_term").cloned(),
        content: query.get("utm_content").cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utm_from_query_picks_up_only_utm_keys() {
        let mut query = HashMap::new();
        query.insert("utm_source".into(), "newsletter".into());
        query.insert("fp_tz".into(), "America/New_York".into());
        let utm = utm_from_query(&query);
        assert_eq!(utm.source.as_deref(), Some("newsletter"));
        assert!(utm.medium.is_none());
    }
}
