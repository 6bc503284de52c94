//! NVS partition generation routes.
//!
//! # Endpoints
//!
//! ### `POST /generate-single`
//! Form field `device_id` (urlencoded or multipart). Returns a partition
//! holding the device ID under the configured namespace and key.
//!
//! ### `POST /api/generate`
//! JSON body `{ "size": "0x6000", "version": 2, "rows": [...] }`. `size`
//! and `version` fall back to the configured defaults.
//!
//! ### `POST /api/generate-csv?size=0x6000&version=2`
//! Generator CSV as the request body.
//!
//! Every endpoint answers with the image as an `application/octet-stream`
//! attachment. Images are built in memory and never written to disk.
//! `file` rows are refused: the server does not read paths named by
//! clients.

use std::sync::OnceLock;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Multipart, Query, Request, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use nvsflash_core::{
    generate, parse_csv, parse_size, Encoding, GenerateOptions, NoFiles, Row, Version,
};
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::error::{ApiError, Result};
use crate::AppState;

/// Largest partition the API builds (16 MiB, the biggest common ESP32 flash).
pub const MAX_PARTITION_SIZE: usize = 16 * 1024 * 1024;

/// Create `/api` generation routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate_rows))
        .route("/generate-csv", post(generate_csv))
}

/// Partition size as a number or a `"0x..."` string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SizeParam {
    Bytes(usize),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub size: Option<SizeParam>,

    #[serde(default)]
    pub version: Option<u8>,

    pub rows: Vec<Row>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateQuery {
    pub size: Option<String>,
    pub version: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct SingleDeviceForm {
    #[serde(default)]
    device_id: Option<String>,
}

/// POST /generate-single
pub async fn generate_single(State(state): State<AppState>, request: Request) -> Result<Response> {
    let device_id = device_id_field(&state, request).await?;
    let device_id = device_id.as_deref().map(str::trim).unwrap_or_default();
    if device_id.is_empty() {
        return Err(ApiError::BadRequest("Device ID is required".to_string()));
    }

    let nvs = &state.settings.nvs;
    let rows = [
        Row::namespace(nvs.namespace.as_str()),
        Row::data(nvs.device_key.as_str(), Encoding::String, device_id),
    ];
    let options = nvs.options()?;
    let image = generate(&rows, &options, &NoFiles)?;

    info!(
        device_id = %device_id,
        bytes = image.len(),
        "Generated single-device NVS partition"
    );

    let filename = format!("{}_nvs_{}.bin", file_stem(device_id), timestamp());
    Ok(attachment(image, &filename))
}

/// POST /api/generate
pub async fn generate_rows(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let size = request.size.map(|size| match size {
        SizeParam::Bytes(bytes) => Ok(bytes),
        SizeParam::Text(text) => parse_size(&text),
    });
    let size = size.transpose()?;
    let options = resolve_options(&state, size, request.version)?;

    let image = generate(&request.rows, &options, &NoFiles)?;
    info!(
        rows = request.rows.len(),
        bytes = image.len(),
        "Generated NVS partition from JSON rows"
    );

    Ok(attachment(image, &format!("nvs_{}.bin", timestamp())))
}

/// POST /api/generate-csv
pub async fn generate_csv(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
    body: axum::body::Bytes,
) -> Result<Response> {
    let size = query.size.as_deref().map(parse_size).transpose()?;
    let options = resolve_options(&state, size, query.version)?;

    let text = std::str::from_utf8(&body)
        .map_err(|e| ApiError::BadRequest(format!("CSV body is not UTF-8: {e}")))?;
    let rows = parse_csv(text)?;
    let image = generate(&rows, &options, &NoFiles)?;
    info!(
        rows = rows.len(),
        bytes = image.len(),
        "Generated NVS partition from CSV"
    );

    Ok(attachment(image, &format!("nvs_{}.bin", timestamp())))
}

/// Reads `device_id` from either form encoding.
async fn device_id_field(state: &AppState, request: Request) -> Result<Option<String>> {
    let multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if !multipart {
        let Form(form) = Form::<SingleDeviceForm>::from_request(request, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return Ok(form.device_id);
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("device_id") {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            return Ok(Some(text));
        }
    }
    Ok(None)
}

/// Configured defaults with per-request overrides.
fn resolve_options(
    state: &AppState,
    size: Option<usize>,
    version: Option<u8>,
) -> Result<GenerateOptions> {
    let mut options = state.settings.nvs.options()?;

    if let Some(size) = size {
        if size > MAX_PARTITION_SIZE {
            return Err(ApiError::BadRequest(format!(
                "Partition size {size:#x} exceeds the {MAX_PARTITION_SIZE:#x} limit"
            )));
        }
        options.size = size;
    }
    if let Some(version) = version {
        options.version = Version::from_number(version).ok_or_else(|| {
            ApiError::BadRequest(format!("Unsupported NVS version {version}, expected 1 or 2"))
        })?;
    }

    Ok(options)
}

fn attachment(image: Vec<u8>, filename: &str) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        image,
    )
        .into_response()
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Device ID reduced to characters safe in a download filename.
fn file_stem(device_id: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars =
        UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid pattern"));

    let stem = unsafe_chars.replace_all(device_id, "_");
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "device".to_string()
    } else {
        stem.chars().take(64).collect()
    }
}
