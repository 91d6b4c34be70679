//! Top-level router assembly: merges the HTTP API's routes with the
//! WebSocket gateway's `/ws` upgrade endpoint (spec.md §2: "HTTP API
//! façade ... plumbing around the services above") and serves both off one
//! listener.

use std::sync::Arc;

use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use fleet_common::Result;
use fleet_gateway::{ConnectionRegistry, GatewayState};

use crate::middleware::get_tracing_layer;
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::types::HealthResponse;

pub struct FleetServer {
    state: AppState,
    gateway: GatewayState,
    registry: ConnectionRegistry,
    ws_path: String,
}

impl FleetServer {
    pub fn new(state: AppState, gateway: GatewayState, registry: ConnectionRegistry, ws_path: String) -> Self {
        Self { state, gateway, registry, ws_path }
    }

    /// The full router: the resource CRUD surface, the `/ws` upgrade, a
    /// health check, and the Swagger UI over the generated OpenAPI document.
    pub fn router(&self) -> Router {
        let api = crate::routes::router().route("/health", get(health_check)).with_state(self.state.clone());

        let ws = fleet_gateway::router(&self.ws_path, self.gateway.clone(), self.registry.clone());

        Router::new()
            .merge(api)
            .merge(ws)
            .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
            .layer(get_tracing_layer())
            .layer(CorsLayer::permissive())
    }

    /// Binds `addr`, serves until `shutdown_signal` resolves, then drains
    /// the connection registry (spec.md §4.2: "clear registry, stop
    /// keep-alive, resolve when the listener is torn down").
    pub async fn run(self, addr: &str) -> Result<()> {
        let registry = self.registry.clone();
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "fleet-server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(Arc::new(registry)))
            .await?;

        Ok(())
    }
}

async fn shutdown_signal(registry: Arc<ConnectionRegistry>) {
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received, closing websocket connections");
    registry.shutdown().await;
}

#[utoipa::path(get, path = "/health", tag = "health", responses((status = 200, body = HealthResponse)))]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: None,
        timestamp: Utc::now(),
    })
}
