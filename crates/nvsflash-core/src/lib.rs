//! # nvsflash-core
//!
//! Core NVS partition generation and flashing metadata.
//!
//! This crate provides:
//! - An NVS partition image writer compatible with ESP-IDF's
//!   `nvs_partition_gen` (version 1 and 2, unencrypted)
//! - A reader that verifies and decodes generated images
//! - CSV / row input with typed value encodings
//! - The ESP Web Tools manifest model
//! - Serial port classification for ESP32 boards
//!
//! This crate is runtime-agnostic and contains no async code,
//! so the same generator can back the HTTP service and the CLI.

pub mod device;
pub mod error;
pub mod input;
pub mod manifest;
pub mod nvs;
pub mod value;

pub use error::NvsError;
pub use input::{generate, parse_csv, parse_size, DirFiles, FileSource, GenerateOptions, NoFiles, Row, RowKind};
pub use manifest::{Manifest, ManifestError};
pub use nvs::{read_partition, Partition, PartitionWriter, Version};
pub use value::{Encoding, NvsValue};
