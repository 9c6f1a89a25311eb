pub mod error;
mod gateway;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

pub use gateway::{GatewayHandle, GatewayStarter};
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sandbox Gateway",
        description = "Local gateway for an emulated cloud application"
    ),
    paths(
        routes::health_check,
        routes::get_manifest,
        routes::list_tables,
        routes::list_items,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::TablesResponse,
        routes::ItemResponse,
        routes::ItemsResponse,
        sandbox_core::ProjectManifest,
        sandbox_core::AppSection,
        sandbox_core::HttpRoute,
        sandbox_core::WsSection,
        sandbox_core::TableSpec,
        sandbox_core::SandboxSettings,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sandbox", description = "Sandbox introspection endpoints"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/ws", get(routes::ws::websocket_handler))
        .route("/_sandbox/manifest", get(routes::get_manifest))
        .route("/_sandbox/tables", get(routes::list_tables))
        .route("/_sandbox/tables/{name}/items", get(routes::list_items))
        .route(
            "/_sandbox/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
