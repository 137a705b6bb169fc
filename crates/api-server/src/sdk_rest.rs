//! The mobile SDK surface: install reporting, attribution lookup,
//! in-app conversion tracking, and the no-redirect resolve variant.

use crate::error::ApiError;
use crate::extract::ValidatedJson;
use crate::state::AppState;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use linkforty_attribution::InstallReport;
use linkforty_core::types::UtmParameters;
use linkforty_resolver::ResolveRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use utoipa::ToSchema;
use uuid::Uuid;

/// `POST /api/sdk/v1/install`.
pub async fn install(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ValidatedJson(mut report): ValidatedJson<InstallReport>,
) -> Result<Json<linkforty_attribution::InstallResult>, ApiError> {
    // "Missing ip_address falls back to the connection's remote address."
    if report.ip_address.is_none() {
        report.ip_address = Some(addr.ip().to_string());
    }
    let result = state.attribution.record_install(report).await?;
    Ok(Json(result))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttributionResponse {
    pub install_id: Uuid,
    pub link_id: Option<Uuid>,
    pub click_id: Option<Uuid>,
    pub attributed: bool,
    pub confidence_score: Option<u8>,
    pub deep_link_data: Value,
    pub retrieved: bool,
}

/// `GET /api/sdk/v1/attribution/{fingerprint_hex}` — retrieve a prior
/// attribution result by device fingerprint.
pub async fn get_attribution(
    State(state): State<AppState>,
    Path(fingerprint_hex): Path<String>,
) -> Result<Json<AttributionResponse>, ApiError> {
    let install = state.attribution.get_attribution(&fingerprint_hex).await?;
    Ok(Json(AttributionResponse {
        install_id: install.id,
        link_id: install.link_id,
        click_id: install.click_id,
        attributed: install.link_id.is_some(),
        confidence_score: install.confidence_score,
        deep_link_data: install.deep_link_payload,
        retrieved: install.retrieved,
    }))
}

#[derive(Debug, Deserialize)]
pub struct InAppEventRequest {
    pub install_id: Uuid,
    pub event_name: String,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InAppEventResponse {
    pub event_id: Uuid,
}

/// `POST /api/sdk/v1/event` — records an in-app conversion event.
pub async fn record_event(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<InAppEventRequest>,
) -> Result<Json<InAppEventResponse>, ApiError> {
    let event_id = state
        .attribution
        .record_in_app_event(
            request.install_id,
            request.event_name,
            request.properties,
            request.timestamp,
        )
        .await?;
    Ok(Json(InAppEventResponse { event_id }))
}

/// `GET /api/sdk/v1/resolve/{code}` — resolve without redirecting, for
/// SDKs that need the destination URL without triggering an HTTP hop.
pub async fn sdk_resolve_code(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    sdk_resolve(&state, &short_code, None, addr, &headers, &query).await
}

/// `GET /api/sdk/v1/resolve/{slug}/{code}`.
pub async fn sdk_resolve_scoped_code(
    State(state): State<AppState>,
    Path((slug, short_code)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    sdk_resolve(&state, &short_code, Some(&slug), addr, &headers, &query).await
}

async fn sdk_resolve(
    state: &AppState,
    short_code: &str,
    slug: Option<&str>,
    addr: SocketAddr,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<Json<Value>, ApiError> {
    let req = ResolveRequest {
        short_code,
        slug,
        ip_address: &addr.ip().to_string(),
        user_agent: header_str(headers, "user-agent").unwrap_or(""),
        accept_language: header_str(headers, "accept-language"),
        referer: header_str(headers, "referer"),
        utm: utm_from_query(query),
    };
    let payload = state.resolver.resolve_sdk(req).await?;
    Ok(Json(payload))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn utm_from_query(query: &HashMap<String, String>) -> UtmParameters {
    UtmParameters {
        source: query.get("utm_source").cloned(),
        medium: query.get("utm_medium").cloned(),
        campaign: query.get("utm_campaign").cloned(),
        term: query.get("utm_term").cloned(),
        content: query.get("utm_content").cloned(),
    }
}
