//! HTTP route handlers.
//!
//! The flashing page and its form endpoint live at the root; everything
//! else is JSON under `/api`.

pub mod assets;
pub mod generate;
pub mod system;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::AppState;

/// Create the main Axum router with all routes.
///
/// Routes are organized as:
/// - `/` - Flashing page
/// - `/static/` - Manifest, firmware and page assets
/// - `/generate-single` - Single-device partition download
/// - `/api/` - Generator, host checks and service info
pub fn create_router(state: AppState) -> Router {
    let static_dir = state.settings.assets.static_dir.clone();
    let body_limit = state.settings.server.max_body_bytes;

    Router::new()
        .route("/", get(assets::index))
        .route("/generate-single", post(generate::generate_single))
        .nest("/api", api_routes())
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Create `/api` routes.
fn api_routes() -> Router<AppState> {
    Router::new()
        // Partition generation
        .merge(generate::api_routes())
        // Ports, tools, info
        .merge(system::routes())
        // Manifest check
        .merge(assets::api_routes())
}
