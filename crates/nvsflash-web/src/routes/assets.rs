//! Flashing page and manifest routes.
//!
//! `index.html` is read from the static directory on every request so the
//! page can be edited without a restart. With the `embed-ui` feature a copy
//! built into the binary is served when the file is absent.
//!
//! ESP Web Tools loads `/static/manifest.json` and resolves each part path
//! against it, so firmware images live next to the manifest.

use std::io;
use std::path::Path;

use axum::{
    extract::State,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use nvsflash_core::Manifest;
use serde::Serialize;

use crate::error::{ApiError, Result};
use crate::AppState;

pub const MANIFEST_FILE: &str = "manifest.json";

#[cfg(feature = "embed-ui")]
#[derive(rust_embed::RustEmbed)]
#[folder = "../../static/"]
struct EmbeddedAssets;

/// Create `/api` manifest routes.
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/manifest", get(manifest))
}

/// Result of checking the served manifest.
#[derive(Debug, Serialize)]
pub struct ManifestReport {
    pub valid: bool,
    pub issues: Vec<String>,
    /// Local part paths with no file in the static directory.
    pub missing_parts: Vec<String>,
    pub manifest: Manifest,
}

/// GET /
pub async fn index(State(state): State<AppState>) -> Result<Response> {
    let path = state.settings.static_file("index.html");
    match tokio::fs::read(&path).await {
        Ok(contents) => Ok(Html(contents).into_response()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => embedded_index()
            .ok_or_else(|| ApiError::NotFound(format!("{} not found", path.display()))),
        Err(e) => Err(e.into()),
    }
}

/// GET /api/manifest
pub async fn manifest(State(state): State<AppState>) -> Result<Json<ManifestReport>> {
    let static_dir = state.settings.assets.static_dir.clone();
    let report = tokio::task::spawn_blocking(move || check_manifest(&static_dir))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(report))
}

/// Parse and validate `manifest.json` in `static_dir`.
pub fn check_manifest(static_dir: &Path) -> Result<ManifestReport> {
    let path = static_dir.join(MANIFEST_FILE);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("{} not found", path.display())));
        }
        Err(e) => return Err(e.into()),
    };

    let manifest = Manifest::from_json(&text)?;
    let issues = manifest.validate();
    let missing_parts: Vec<String> = manifest
        .local_parts()
        .into_iter()
        .filter(|part| !static_dir.join(part).is_file())
        .map(str::to_string)
        .collect();

    Ok(ManifestReport {
        valid: issues.is_empty() && missing_parts.is_empty(),
        issues,
        missing_parts,
        manifest,
    })
}

#[cfg(feature = "embed-ui")]
fn embedded_index() -> Option<Response> {
    EmbeddedAssets::get("index.html").map(|file| Html(file.data.into_owned()).into_response())
}

#[cfg(not(feature = "embed-ui"))]
fn embedded_index() -> Option<Response> {
    None
}
