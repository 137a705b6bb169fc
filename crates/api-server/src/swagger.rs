//! OpenAPI specification for the public HTTP surface.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LinkForty API",
        version = "0.1.0",
        description = "Self-hosted deep-link routing and attribution engine.\n\nResolves short codes to device-aware destinations, records click/install attribution, and fans out signed webhooks.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Operations", description = "Health, readiness, and liveness probes"),
        (name = "SDK", description = "Mobile SDK install reporting, attribution lookup, and conversion tracking"),
    ),
    paths(
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        crate::rest::HealthResponse,
        crate::error::ErrorBody,
        crate::sdk_rest::AttributionResponse,
        crate::sdk_rest::InAppEventResponse,
    ))
)]
pub struct ApiDoc;
