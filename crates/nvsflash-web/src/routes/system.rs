//! Host check routes.
//!
//! ### `GET /api/list-ports`
//! Serial ports with ESP32 boards ranked first.
//!
//! ### `GET /api/validate-tools`
//! Availability of the generator, optional local tools and static assets.
//!
//! ### `GET /api/info`
//! Service name, version and partition defaults.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use nvsflash_core::device::{list_ports as rank_ports, PortListing};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use crate::error::Result;
use crate::tools::check_tools;
use crate::AppState;

/// Create host check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/list-ports", get(list_ports))
        .route("/validate-tools", get(validate_tools))
        .route("/info", get(info))
}

/// Service description returned by `/api/info`.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub nvs: NvsDefaults,
}

#[derive(Debug, Serialize)]
pub struct NvsDefaults {
    pub partition_size: usize,
    pub version: u8,
    pub namespace: String,
    pub device_key: String,
}

/// GET /api/list-ports
pub async fn list_ports(State(state): State<AppState>) -> Response {
    let scanner = Arc::clone(&state.ports);
    let scanned = tokio::task::spawn_blocking(move || scanner.scan())
        .await
        .unwrap_or_else(|e| Err(e.to_string()));

    match scanned {
        Ok(ports) => {
            let listing: PortListing = rank_ports(ports);
            debug!(
                total = listing.total_count,
                esp = listing.esp_count,
                "Listed serial ports"
            );
            Json(listing).into_response()
        }
        Err(e) => {
            error!("Port detection failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": format!("Port detection failed: {e}"),
                    "ports": [],
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/validate-tools
pub async fn validate_tools(State(state): State<AppState>) -> Json<BTreeMap<String, bool>> {
    Json(check_tools(&state.settings).await)
}

/// GET /api/info
pub async fn info(State(state): State<AppState>) -> Result<Json<ServiceInfo>> {
    let options = state.settings.nvs.options()?;
    Ok(Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        nvs: NvsDefaults {
            partition_size: options.size,
            version: options.version.number(),
            namespace: state.settings.nvs.namespace.clone(),
            device_key: state.settings.nvs.device_key.clone(),
        },
    }))
}
