//! API server — builds the router and starts the HTTP + metrics listeners.

use crate::live_ws;
use crate::redirect_rest;
use crate::rest;
use crate::sdk_rest;
use crate::state::AppState;
use crate::swagger::ApiDoc;
use axum::routing::{get, post};
use axum::Router;
use linkforty_core::config::AppConfig;
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Assemble the full router. Split out from `start_http` so tests can
    /// drive requests through it without binding a real listener.
    pub fn into_router(self) -> Router {
        let redirect_routes = Router::new()
            .route("/{code}", get(redirect_rest::resolve_code))
            .route("/{code}/preview", get(redirect_rest::preview_code))
            .route("/{slug}/{code}", get(redirect_rest::resolve_scoped_code))
            .route(
                "/{slug}/{code}/preview",
                get(redirect_rest::preview_scoped_code),
            )
            .with_state(self.state.clone());

        let sdk_routes = Router::new()
            .route("/api/sdk/v1/install", post(sdk_rest::install))
            .route(
                "/api/sdk/v1/attribution/{fingerprint_hex}",
                get(sdk_rest::get_attribution),
            )
            .route("/api/sdk/v1/event", post(sdk_rest::record_event))
            .route(
                "/api/sdk/v1/resolve/{code}",
                get(sdk_rest::sdk_resolve_code),
            )
            .route(
                "/api/sdk/v1/resolve/{slug}/{code}",
                get(sdk_rest::sdk_resolve_scoped_code),
            )
            .with_state(self.state.clone());

        let debug_routes = Router::new()
            .route("/api/debug/live", get(live_ws::live))
            .with_state(self.state.clone());

        let ops_routes = Router::new()
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            .with_state(self.state);

        Router::new()
            .merge(redirect_routes)
            .merge(sdk_routes)
            .merge(debug_routes)
            .merge(ops_routes)
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Start the HTTP server with graceful shutdown wired by the caller.
    pub async fn start_http(self, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        let app = self.into_router();

        info!(addr = %addr, "starting HTTP server");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        Ok(())
    }

    /// Start the Prometheus metrics exporter on its own port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "metrics exporter started");
        std::mem::forget(handle);
        Ok(())
    }
}
