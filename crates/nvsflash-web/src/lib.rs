//! # nvsflash-web
//!
//! Web UI and REST API for provisioning ESP32 boards.
//!
//! This crate provides:
//! - The flashing page (`index.html`) and the static assets ESP Web Tools
//!   fetches from the browser (`manifest.json`, firmware images)
//! - NVS partition generation from a device ID, JSON rows or CSV
//! - Host checks: serial port listing, tool availability, manifest sanity
//!
//! ## Architecture
//!
//! The web layer is built on Axum and provides these route groups:
//!
//! - `/` and `/static/` - Flashing page and assets
//! - `/generate-single` - Form endpoint used by the page
//! - `/api/` - JSON API
//!
//! Flashing itself runs in the browser over WebUSB; nothing here touches
//! a serial port beyond listing it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nvsflash_web::{create_router, ServerState, Settings};
//!
//! let settings = Settings::load(None)?;
//! let app = create_router(ServerState::new(settings));
//!
//! let listener = TcpListener::bind("0.0.0.0:8001").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod ports;
pub mod routes;
pub mod settings;
pub mod tools;

// Re-exports
pub use error::ApiError;
pub use ports::{PortScanner, StaticPorts, SystemPorts};
pub use routes::create_router;
pub use settings::{Settings, SettingsError};

use std::sync::Arc;

/// Shared server state for all route handlers.
pub struct ServerState {
    pub settings: Settings,
    pub ports: Arc<dyn PortScanner>,
}

impl ServerState {
    /// State backed by the host's serial ports.
    pub fn new(settings: Settings) -> AppState {
        Self::with_ports(settings, Arc::new(SystemPorts))
    }

    pub fn with_ports(settings: Settings, ports: Arc<dyn PortScanner>) -> AppState {
        Arc::new(Self { settings, ports })
    }
}

/// Type alias for shared state in Axum handlers.
pub type AppState = Arc<ServerState>;
